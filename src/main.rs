mod crawler;
mod db;
mod parser;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use db::{Catalog, Page, QuoteRow};

#[derive(Parser)]
#[command(name = "quotecrawl", about = "Quote catalog fed by a paginated listing crawl")]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true, default_value = "data/quotes.sqlite")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the listing source and ingest every quote
    Crawl {
        /// Listing source root
        #[arg(long, default_value = crawler::DEFAULT_BASE_URL)]
        base_url: String,
        /// Max pages to fetch (default: walk until the last page)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Paginated author list
    Authors {
        #[arg(short, long, default_value = "1")]
        page: usize,
    },
    /// One author and all their quotes
    Author { id: i64 },
    /// Paginated quote list plus the most-used tags
    Quotes {
        #[arg(short, long, default_value = "1")]
        page: usize,
    },
    /// Quotes carrying one tag
    Tag {
        name: String,
        #[arg(short, long, default_value = "1")]
        page: usize,
    },
    /// Register an author by hand
    AddAuthor {
        #[arg(long)]
        name: String,
    },
    /// Register a quote by hand (its author must already exist)
    AddQuote {
        #[arg(long)]
        text: String,
        #[arg(long)]
        author: String,
        /// Comma-separated tag names
        #[arg(long)]
        tags: Option<String>,
    },
    /// Catalog totals
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    if let Some(dir) = cli.db.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let catalog = Catalog::open(&cli.db)
        .with_context(|| format!("Failed to open catalog at {}", cli.db.display()))?;

    let result = match cli.command {
        Commands::Crawl { base_url, limit } => {
            println!("Crawling {base_url} ...");
            let stats = crawler::crawl(&catalog, &base_url, limit).await?;
            println!(
                "Done: {} pages, {} quotes seen ({} new), {} new authors, {} new tags.",
                stats.pages, stats.quotes_seen, stats.quotes_new, stats.authors_new, stats.tags_new
            );
            Ok(())
        }
        Commands::Authors { page } => {
            let authors = catalog.list_authors(page)?;
            if authors.total_items == 0 {
                println!("No authors yet. Run 'crawl' or 'add-author' first.");
                return Ok(());
            }
            println!("{:>4} | Author", "ID");
            println!("{}", "-".repeat(40));
            for author in &authors.items {
                println!("{:>4} | {}", author.id, author.name);
            }
            print_pager(&authors);
            Ok(())
        }
        Commands::Author { id } => {
            let author = catalog.author(id)?;
            let quotes = catalog.quotes_by_author(author.id)?;
            println!("{} ({} quotes)", author.name, quotes.len());
            println!("{}", "-".repeat(40));
            print_quote_rows(&quotes);
            Ok(())
        }
        Commands::Quotes { page } => {
            let quotes = catalog.list_quotes(page)?;
            if quotes.total_items == 0 {
                println!("No quotes yet. Run 'crawl' first.");
                return Ok(());
            }
            print_quote_rows(&quotes.items);
            print_pager(&quotes);

            let top = catalog.top_tags(10)?;
            if !top.is_empty() {
                println!("\n--- Top tags ---");
                for tag in &top {
                    println!("  {:<28} {:>4}", tag.name, tag.quotes);
                }
            }
            Ok(())
        }
        Commands::Tag { name, page } => {
            let quotes = catalog.quotes_by_tag(&name, page)?;
            println!("Quotes tagged `{}` ({} total)", name, quotes.total_items);
            print_quote_rows(&quotes.items);
            print_pager(&quotes);
            Ok(())
        }
        Commands::AddAuthor { name } => {
            let author = catalog.add_author(&name)?;
            println!("Added author #{}: {}", author.id, author.name);
            Ok(())
        }
        Commands::AddQuote { text, author, tags } => {
            let tag_names: Vec<String> = tags
                .as_deref()
                .map(|t| t.split(',').map(str::to_string).collect())
                .unwrap_or_default();
            let quote = catalog.add_quote(&text, &author, &tag_names)?;
            println!("Added quote #{} by {}", quote.id, author.trim());
            Ok(())
        }
        Commands::Stats => {
            let totals = catalog.stats()?;
            println!("Authors: {}", totals.authors);
            println!("Quotes:  {}", totals.quotes);
            println!("Tags:    {}", totals.tags);
            println!("Links:   {}", totals.links);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_quote_rows(rows: &[QuoteRow]) {
    println!("{:>4} | {:<62} | {:<22} | Tags", "ID", "Quote", "Author");
    println!("{}", "-".repeat(110));
    for quote in rows {
        println!(
            "{:>4} | {:<62} | {:<22} | {}",
            quote.id,
            truncate(&quote.text, 62),
            truncate(&quote.author, 22),
            quote.tags.join(", ")
        );
    }
}

fn print_pager<T>(page: &Page<T>) {
    println!(
        "\nPage {}/{} ({} total)",
        page.number, page.total_pages, page.total_items
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
