use anyhow::{anyhow, Result};
use clap::Parser;
use reqwest::{header, Client, Url};
use scraper::{Html, Selector};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "fetcher")]
#[command(about = "Download pages and write indexer-ready JSONL of (title, source, body)")]
struct Cli {
    /// File with one URL per line; blank lines and # comments are ignored
    #[arg(long)]
    urls: String,
    /// Output JSONL file path
    #[arg(long, default_value = "./sample_data/pages.jsonl")]
    output: String,
    /// Number of concurrent downloads
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// Skip responses larger than this many bytes
    #[arg(long, default_value_t = 2 * 1024 * 1024)]
    max_bytes: usize,
    #[arg(long, default_value = "sift-fetcher/0.1")]
    user_agent: String,
}

#[derive(Serialize)]
struct OutDoc {
    title: String,
    source: String,
    body: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();
    if let Some(dir) = std::path::Path::new(&args.output).parent() {
        fs::create_dir_all(dir).ok();
    }

    let client = Client::builder()
        .user_agent(args.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;

    let mut queue: Vec<Url> = Vec::new();
    for line in BufReader::new(File::open(&args.urls)?).lines() {
        let s = line?.trim().to_string();
        if s.is_empty() || s.starts_with('#') { continue; }
        match Url::parse(&s).or_else(|_| Url::parse(&format!("https://{s}"))) {
            Ok(u) => queue.push(u),
            Err(e) => tracing::warn!(line = %s, error = %e, "skipping unparsable url"),
        }
    }
    if queue.is_empty() { return Err(anyhow!("no valid urls")); }
    queue.reverse();
    tracing::info!(urls = queue.len(), concurrency = args.concurrency, output = %args.output, "fetching");

    let mut out = BufWriter::new(File::create(&args.output)?);
    let mut inflight: JoinSet<(Url, Result<Option<OutDoc>>)> = JoinSet::new();
    let mut written = 0usize;
    loop {
        while inflight.len() < args.concurrency.max(1) {
            let Some(url) = queue.pop() else { break };
            let client = client.clone();
            let max_bytes = args.max_bytes;
            inflight.spawn(async move {
                let res = fetch(&client, &url, max_bytes).await;
                (url, res)
            });
        }
        let Some(joined) = inflight.join_next().await else { break };
        match joined? {
            (url, Ok(Some(doc))) => {
                serde_json::to_writer(&mut out, &doc)?;
                out.write_all(b"\n")?;
                written += 1;
                tracing::debug!(%url, "fetched");
            }
            (url, Ok(None)) => tracing::info!(%url, "skipped non-html or oversized response"),
            (url, Err(e)) => tracing::warn!(%url, error = %e, "fetch failed"),
        }
    }
    out.flush()?;
    tracing::info!(written, "done");
    Ok(())
}

async fn fetch(client: &Client, url: &Url, max_bytes: usize) -> Result<Option<OutDoc>> {
    let resp = client.get(url.clone()).send().await?.error_for_status()?;
    if let Some(ct) = resp.headers().get(header::CONTENT_TYPE) {
        if let Ok(v) = ct.to_str() {
            if !v.starts_with("text/html") { return Ok(None); }
        }
    }
    let bytes = resp.bytes().await?;
    if bytes.len() > max_bytes { return Ok(None); }
    let html = String::from_utf8_lossy(&bytes);
    let (title, body) = extract(&html)?;
    Ok(Some(OutDoc { title, source: url.to_string(), body }))
}

/// Page title and visible text; script, style and noscript content is dropped.
fn extract(html: &str) -> Result<(String, String)> {
    let doc = Html::parse_document(html);
    let sel_title = Selector::parse("title").map_err(|e| anyhow!("bad selector: {e:?}"))?;
    let sel_body = Selector::parse("body").map_err(|e| anyhow!("bad selector: {e:?}"))?;

    let title = doc
        .select(&sel_title)
        .next()
        .map(|n| n.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let root = doc.select(&sel_body).next().unwrap_or_else(|| doc.root_element());
    let mut pieces: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
        });
        if !hidden {
            pieces.extend(text.split_whitespace());
        }
    }
    Ok((title, pieces.join(" ")))
}
