use spider_sched::prelude::*;
use spider_sched::module::{analyzers, downloaders, pipelines};
use spider_sched::{ErrorKind, ParseResponse, ProcessItem, Status};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// example.com with a handful of linked pages, one broken page and links
/// leaving the site.
struct FakeSite;

#[async_trait]
impl Fetcher for FakeSite {
    async fn fetch(&self, request: &Request) -> anyhow::Result<Response> {
        let body: &'static str = match request.url.path() {
            "/" => "/news\n/about\nhttps://www.example.com/contact\nhttps://elsewhere.net/\nmailto:me@example.com",
            "/news" => "/news/1\n/\n",
            "/about" => "/missing",
            "/contact" => "",
            "/missing" => anyhow::bail!("404 for {}", request.url),
            other => anyhow::bail!("unexpected fetch of {}", other),
        };
        Ok(Response::new(
            request.clone(),
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(body.as_bytes()),
        ))
    }
}

fn links(resp: &Response, _depth: u32) -> (Vec<ParsedData>, Vec<anyhow::Error>) {
    let mut data = Vec::new();
    let mut errors = Vec::new();
    for href in resp.text().lines().map(str::trim).filter(|l| !l.is_empty()) {
        match resp.follow(href) {
            Ok(req) => data.push(ParsedData::Request(req)),
            Err(e) => errors.push(e.into()),
        }
    }
    (data, errors)
}

fn pages(resp: &Response, depth: u32) -> (Vec<ParsedData>, Vec<anyhow::Error>) {
    let item = Item::new()
        .with("url", resp.url.as_str())
        .with("depth", depth);
    (vec![item.into()], vec![])
}

async fn wait_idle(scheduler: &Scheduler) {
    tokio::time::timeout(Duration::from_secs(10), async {
        let mut idle = 0;
        while idle < 3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            idle = if scheduler.idle() { idle + 1 } else { 0 };
        }
    })
    .await
    .expect("crawl did not go idle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scheduler_crawls_a_site_to_depth_one() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let store = {
        let seen = Arc::clone(&seen);
        move |item: Item| -> anyhow::Result<Option<Item>> {
            let url = item
                .get("url")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            seen.lock().push(url);
            Ok(Some(item))
        }
    };

    let parsers: Vec<ParseResponse> = vec![Arc::new(links), Arc::new(pages)];
    let processors: Vec<ProcessItem> = vec![Arc::new(store)];
    let module_args = ModuleArgs::new(
        downloaders(3, Arc::new(FakeSite)).unwrap(),
        analyzers(2, parsers).unwrap(),
        pipelines(1, processors).unwrap(),
    );

    let scheduler = Scheduler::new();
    scheduler
        .init(
            RequestArgs::new(["example.com"], 1).with_max_retries(0),
            DataArgs::uniform(1, 10),
            module_args,
        )
        .unwrap();
    let errors = scheduler.error_chan().unwrap();
    scheduler
        .start(Request::parse("http://example.com/").unwrap())
        .unwrap();

    wait_idle(&scheduler).await;
    let summary = scheduler.summary();
    assert_eq!(summary.status, Status::Started);
    // "/", "/news", "/about" and "www.example.com/contact".
    assert_eq!(summary.num_url, 4);
    assert_eq!(summary.downloaders.len(), 3);
    assert_eq!(summary.analyzers.len(), 2);
    assert_eq!(summary.request_buffer_pool.total, 0);
    assert_eq!(summary.item_buffer_pool.total, 0);

    let mut urls = seen.lock().clone();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "http://example.com/",
            "http://example.com/about",
            "http://example.com/news",
            "https://www.example.com/contact",
        ]
    );

    let stats = scheduler.stats().snapshot();
    assert_eq!(stats.downloads_succeeded, 4);
    assert_eq!(stats.items_processed, 4);

    scheduler.stop().await.unwrap();
    assert_eq!(scheduler.status(), Status::Stopped);

    // Off-site and non-http links are filtered, not reported.
    let mut kinds: Vec<ErrorKind> = Vec::new();
    while let Ok(Ok(err)) = tokio::time::timeout(Duration::from_secs(1), errors.recv()).await {
        kinds.push(err.kind());
    }
    assert!(kinds.is_empty(), "unexpected errors: {:?}", kinds);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crawler_runs_until_idle() {
    let crawler = CrawlerBuilder::new()
        .max_depth(2)
        .max_retries(1)
        .data_args(DataArgs::uniform(2, 8))
        .fetcher(FakeSite)
        .parser(links)
        .parser(pages)
        .processor(|item: Item| -> anyhow::Result<Option<Item>> { Ok(Some(item)) })
        .max_idle_count(3)
        .idle_interval(Duration::from_millis(20))
        .build()
        .unwrap();

    let summary = tokio::time::timeout(
        Duration::from_secs(15),
        crawler.crawl(Request::parse("http://example.com/").unwrap()),
    )
    .await
    .expect("crawl timed out")
    .unwrap();

    assert_eq!(summary.status, Status::Stopped);
    // Depth 2 adds "/news/1" and "/missing".
    assert_eq!(summary.num_url, 6);
    assert_eq!(summary.request_args.accepted_domains, vec!["example.com"]);

    let stats = crawler.stats().snapshot();
    assert_eq!(stats.requests_dropped, 2);
    assert_eq!(stats.requests_retried, 2);
    assert_eq!(stats.downloads_failed, 4);
    assert!(stats.errors_reported >= 4);
    assert_eq!(stats.items_processed, 4);
}
