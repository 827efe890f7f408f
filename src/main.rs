use clap::Parser;
use colored::*;
use futures_util::future::join_all;

use live_coders::cli::{Args, Command};
use live_coders::comments::CommentClient;
use live_coders::config::Config;
use live_coders::contest::ContestClient;
use live_coders::live::LiveCard;
use live_coders::problems::{difficulty_color, ProblemsClient};
use live_coders::statement::StatementClient;
use live_coders::store::LocalStore;
use live_coders::web;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Colour a problem label by its difficulty band.
fn paint(label: &str, difficulty: f64) -> ColoredString {
    match difficulty_color(difficulty) {
        "grey" => label.bright_black(),
        "brown" => label.yellow().dimmed(),
        "green" => label.green(),
        "cyan" => label.cyan(),
        "blue" => label.blue(),
        "yellow" => label.bright_yellow(),
        "orange" => label.truecolor(255, 128, 0),
        _ => label.red(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Serve { port, bind } => {
            web::serve(config, &bind, port).await?;
        }
        Command::Problems { limit } => {
            let client = ProblemsClient::new(config.http_client(), &config);
            let set = client.load_working_set().await?;
            let shown = limit.unwrap_or(set.len());
            for p in set.iter().take(shown) {
                println!(
                    "{}  {}",
                    paint(&p.label(), p.difficulty),
                    format!("({:.0})", p.difficulty).bright_black()
                );
            }
            eprintln!(
                "{}",
                format!("  {} of {} problems shown", shown.min(set.len()), set.len()).bright_blue()
            );
        }
        Command::Statement { urls } => {
            let client = StatementClient::new(config.http_client(), config.proxies.clone());
            let results = join_all(urls.iter().map(|url| client.fetch(url))).await;
            for (url, result) in urls.iter().zip(results) {
                println!("{}", url.bold());
                match result {
                    Ok(content) => {
                        println!(
                            "  time limit: {}  memory limit: {}",
                            content.time_limit.bright_green(),
                            content.memory_limit.bright_green()
                        );
                        println!("{}", serde_json::to_string_pretty(&content)?);
                    }
                    Err(e) => eprintln!("  {}", e.user_message().red()),
                }
            }
        }
        Command::Contest { id } => {
            let client = ContestClient::new(config.http_client(), &config.atcoder_base_url);
            match client.fetch_contest(&id).await {
                Ok(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
                Err(e) => {
                    eprintln!("{}", e.user_message().red());
                    std::process::exit(1);
                }
            }
        }
        Command::Comments { room } => {
            let client = CommentClient::new(config.http_client(), &config.comments_base_url);
            let messages = client
                .list(room.unwrap_or(config.room_id), Some(config.user_id))
                .await;
            for m in messages {
                let hearts = m
                    .liked_cnt
                    .map(|n| format!(" ♥{n}"))
                    .unwrap_or_default();
                println!("{} {}{}", m.user.bold(), m.message, hearts.bright_red());
            }
        }
        Command::Live { url } => {
            let store = LocalStore::open(&config.store_path).shared();
            let mut card = LiveCard::load(store);
            if url == "stop" {
                card.stop()?;
                println!("{}", "live video cleared".bright_blue());
            } else {
                match card.submit(&url) {
                    Ok(id) => println!("{} {}", "live video set:".bright_green(), id),
                    Err(e) => {
                        eprintln!("{}", e.user_message().red());
                        std::process::exit(1);
                    }
                }
            }
        }
    }

    Ok(())
}
