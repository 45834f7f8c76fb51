//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use jike_roast::cache::{ManualClock, ResultCache};
use jike_roast::error::{AppError, Result};
use jike_roast::fan_out::FanOut;
use jike_roast::llm::{InvokeError, ModelBackend, ModelInvoker};
use jike_roast::scraper::PageSource;
use jike_roast::service::RoastService;

pub const PROFILE_URL: &str = "https://x/y";

pub fn profile_page(nickname: &str) -> String {
    format!(
        r#"<html><body>
             <div class="user-screenname">{}</div>
             <div class="user-status">在路上</div>
             <div class="brief">产品经理，喜欢咖啡</div>
             <div class="text">又是开会的一天</div>
             <div class="text">新买的键盘到了</div>
           </body></html>"#,
        nickname
    )
}

pub fn page_without_bio() -> String {
    r#"<html><body>
         <div class="user-screenname">无名</div>
         <div class="user-status">在路上</div>
         <div class="text">只有帖子</div>
       </body></html>"#
        .to_string()
}

/// Serves canned pages and counts fetches.
#[derive(Default)]
pub struct StubPages {
    pages: HashMap<String, String>,
    pub fetches: AtomicUsize,
}

impl StubPages {
    pub fn with_page(mut self, url: &str, html: String) -> Self {
        self.pages.insert(url.to_string(), html);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for StubPages {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::FetchError(format!("HTTP 404 for {}", url)))
    }
}

/// Answers every model after `delay`; models named "broken*" fail.
pub struct StubModels {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl StubModels {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelBackend for StubModels {
    async fn complete(&self, model_id: &str, _prompt: &str) -> std::result::Result<String, InvokeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if model_id.starts_with("broken") {
            return Err(InvokeError::Status {
                status: 503,
                message: "model overloaded".to_string(),
            });
        }
        Ok(format!("{} says: nice keyboard", model_id))
    }
}

pub struct Harness {
    pub service: Arc<RoastService>,
    pub pages: Arc<StubPages>,
    pub models: Arc<StubModels>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(pages: StubPages, model_ids: &[&str], ttl: Duration, model_delay: Duration) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap()));
    let cache = Arc::new(ResultCache::with_clock(ttl, 64, clock.clone()));
    let pages = Arc::new(pages);
    let models = Arc::new(StubModels::new(model_delay));
    let fan_out = FanOut::new(ModelInvoker::new(models.clone(), None), 8);
    let service = RoastService::new(
        cache,
        pages.clone(),
        fan_out,
        model_ids.iter().map(|m| m.to_string()).collect(),
    );

    Harness {
        service: Arc::new(service),
        pages,
        models,
        clock,
    }
}
