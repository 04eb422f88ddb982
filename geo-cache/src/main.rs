use anyhow::Result;
use clap::Parser;
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    select,
};
use tracing::warn;

use geo_cache::{
    DistributedCache,
    cli::Cli,
    console::{ConsoleCommand, HELP},
};

type NodeCache = DistributedCache<String, String>;

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so stdout carries only prompt output.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cache = NodeCache::start(cli.cache_config()?).await?;
    write_stdout(&format!("listening on {}", cache.local_addr())).await?;

    let result = run_console(&cache).await;
    cache.shutdown().await;
    result
}

async fn run_console(cache: &NodeCache) -> Result<()> {
    let mut stdin = BufReader::new(io::stdin());
    let mut input = String::new();

    loop {
        input.clear();
        select! {
            bytes_read = stdin.read_line(&mut input) => {
                if bytes_read? == 0 || !handle_line(cache, &input).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }
    Ok(())
}

/// Executes one line. Returns `false` when the node should exit.
async fn handle_line(cache: &NodeCache, line: &str) -> Result<bool> {
    if line.trim().is_empty() {
        return Ok(true);
    }

    match ConsoleCommand::parse(line) {
        Ok(ConsoleCommand::Set { key, value }) => {
            cache.set(key.clone(), value);
            let version = cache.version(&key).unwrap_or_default();
            write_stdout(&format!("OK {key} (version {version})")).await?;
        }
        Ok(ConsoleCommand::Get { key }) => match cache.get(&key) {
            Some(value) => write_stdout(&value).await?,
            None => write_stdout("(nil)").await?,
        },
        Ok(ConsoleCommand::Status) => render_status(cache).await?,
        Ok(ConsoleCommand::Help) => write_stdout(HELP).await?,
        Ok(ConsoleCommand::Exit) => {
            write_stdout("bye").await?;
            return Ok(false);
        }
        Err(err) => write_stderr(&format!("error: {err}")).await?,
    }
    Ok(true)
}

async fn render_status(cache: &NodeCache) -> io::Result<()> {
    let peers: Vec<String> = cache.peers().iter().map(ToString::to_string).collect();
    write_stdout(&format!(
        "region {} | listen {} | peers [{}]",
        cache.region(),
        cache.local_addr(),
        peers.join(", ")
    ))
    .await?;

    let snapshot = cache.snapshot();
    write_stdout(&format!("{} entries (oldest first)", snapshot.len())).await?;
    for (key, value, version) in snapshot {
        write_stdout(&format!("  {key} = {value} (version {version})")).await?;
    }
    Ok(())
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
