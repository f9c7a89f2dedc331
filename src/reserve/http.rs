//! HTTP client for the course-selection endpoint.
//!
//! Besides the reservation attempt itself, the client can check a session
//! cookie and browse the catalogue (courses, then their sections) so users
//! can find the section id to monitor.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AttemptContext, Reserve};
use crate::error::{Error, Result};
use crate::model::{RawResult, TaskKey};

pub const DEFAULT_BASE_URL: &str = "https://bkjx.nenu.edu.cn";

/// Category whose listing doubles as a session check.
const VALIDATION_CATEGORY: &str = "major_benbu";

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:146.0) Gecko/20100101 Firefox/146.0";

/// Course categories and their endpoint codes.
const CATEGORIES: &[(&str, &str)] = &[
    ("public_jingyue", "08"),
    ("major_jingyue", "07"),
    ("public_benbu", "06"),
    ("major_benbu", "02"),
];

/// Endpoint code for a category name, if it is one we know.
pub fn category_code(category: &str) -> Option<&'static str> {
    CATEGORIES
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, code)| *code)
}

/// Names of all known categories.
pub fn categories() -> impl Iterator<Item = &'static str> {
    CATEGORIES.iter().map(|(name, _)| *name)
}

/// Normalize a pasted cookie string into a `Cookie` header value.
///
/// Keeps `name=value` pairs, drops fragments without `=`, trims whitespace.
pub fn normalize_cookies(raw: &str) -> String {
    raw.split(';')
        .map(str::trim)
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| format!("{name}={}", value.trim()))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// [`Reserve`] implementation backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpReserver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReserver {
    /// Build a client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// URL of `action` (`add`, `hzkc`, `kxkc`) for a category.
    pub fn action_url(&self, category: &str, action: &str) -> Result<String> {
        let code = category_code(category)
            .ok_or_else(|| Error::Config(format!("unknown course category: {category}")))?;
        Ok(format!("{}/new/student/xsxk/xklx/{code}/{action}", self.base_url))
    }

    /// URL of the "add" action for a category.
    pub fn add_url(&self, category: &str) -> Result<String> {
        self.action_url(category, "add")
    }

    fn headers(&self, code: &str, cookies: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(
                "zh-CN,zh;q=0.8,zh-TW;q=0.7,zh-HK;q=0.5,en-US;q=0.3,en;q=0.2",
            ),
        );
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
        if let Ok(origin) = HeaderValue::from_str(&self.base_url) {
            headers.insert(header::ORIGIN, origin);
        }
        let referer = format!("{}/xsxk.html?xklxdm={code}#", self.base_url);
        if let Ok(referer) = HeaderValue::from_str(&referer) {
            headers.insert(header::REFERER, referer);
        }
        if let Ok(mut cookie) = HeaderValue::from_str(cookies) {
            cookie.set_sensitive(true);
            headers.insert(header::COOKIE, cookie);
        }
        headers
    }

    /// POST a form to `action` under `category`, as the browser page would.
    async fn post_form<T>(
        &self,
        category: &str,
        action: &str,
        cookies: &SecretString,
        form: &T,
    ) -> Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        let url = self.action_url(category, action)?;
        let code = category_code(category).unwrap_or_default();
        let cookies = normalize_cookies(cookies.expose_secret());

        let response = self
            .client
            .post(&url)
            .headers(self.headers(code, &cookies))
            .form(form)
            .send()
            .await?;
        Ok(response)
    }

    async fn send(&self, key: &TaskKey, ctx: &AttemptContext) -> Result<RawResult> {
        let form = [
            ("kcrwdm", key.resource_id.as_str()),
            ("kcmc", ctx.display_name.as_str()),
            ("qz", "-1"),
            ("hlct", "0"),
        ];
        let response = self
            .post_form(&key.category, "add", &ctx.credentials, &form)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(RawResult::transport_failure(format!(
                "endpoint returned {status}"
            )));
        }

        let body: serde_json::Value = response.json().await?;
        Ok(parse_reply(&body))
    }

    /// Check that `cookies` still belong to a logged-in session.
    ///
    /// Asks for a one-row course listing; a live session answers with a
    /// `total` field, an expired one with a login page or an error status.
    ///
    /// # Errors
    ///
    /// [`Error::Http`] if the endpoint cannot be reached at all.
    pub async fn validate(&self, cookies: &SecretString) -> Result<bool> {
        let form = [("page", "1"), ("rows", "1")];
        let response = self
            .post_form(VALIDATION_CATEGORY, "hzkc", cookies, &form)
            .await?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "cookie validation rejected");
            return Ok(false);
        }
        Ok(match response.json::<serde_json::Value>().await {
            Ok(body) => body.get("total").is_some(),
            Err(_) => false,
        })
    }

    /// Search the course catalogue of one category.
    pub async fn search(
        &self,
        cookies: &SecretString,
        category: &str,
        filters: &SearchFilters,
        page: Page,
    ) -> Result<Listing> {
        let mut form = filters.form_fields();
        form.extend(page.form_fields("kcmc"));
        let response = self.post_form(category, "hzkc", cookies, &form).await?;
        read_listing(response).await
    }

    /// List the sections (instructor, time, section id) offered for a course.
    pub async fn sections(
        &self,
        cookies: &SecretString,
        category: &str,
        course_id: &str,
        page: Page,
    ) -> Result<Listing> {
        let mut form = vec![
            ("kcptdm", course_id.to_string()),
            ("hasme", "0".to_string()),
        ];
        form.extend(page.form_fields("kcrwdm"));
        let response = self.post_form(category, "kxkc", cookies, &form).await?;
        read_listing(response).await
    }
}

/// Filters for [`HttpReserver::search`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Free-text course keyword.
    pub keyword: String,
    /// Offering department code.
    pub department: String,
    pub campus: String,
    /// Cohort year.
    pub year: String,
    pub major: String,
    pub course_group: String,
    /// Day of week.
    pub weekday: String,
    /// Class period.
    pub period: String,
    pub course_kind: String,
    /// Only courses the student has already chosen.
    pub mine_only: bool,
}

impl SearchFilters {
    /// Form fields in the endpoint's vocabulary.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("kkyxdm", self.department.clone()),
            ("xqdm", self.campus.clone()),
            ("nd", self.year.clone()),
            ("zydm", self.major.clone()),
            ("kcdldm", self.course_group.clone()),
            ("xq", self.weekday.clone()),
            ("jc", self.period.clone()),
            ("kcxx", self.keyword.clone()),
            ("kcfl", self.course_kind.clone()),
            ("hasme", u8::from(self.mine_only).to_string()),
        ]
    }
}

/// One page of a listing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    pub rows: u32,
}

impl Page {
    pub fn new(number: u32, rows: u32) -> Self {
        Self {
            number: number.max(1),
            rows: rows.max(1),
        }
    }

    fn form_fields(self, sort: &'static str) -> Vec<(&'static str, String)> {
        vec![
            ("page", self.number.to_string()),
            ("rows", self.rows.to_string()),
            ("sort", sort.to_string()),
            ("order", "asc".to_string()),
        ]
    }
}

/// A page of rows as the endpoint returns them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Total matching rows across all pages, when reported.
    pub total: Option<u64>,
    pub rows: Vec<serde_json::Value>,
}

impl Listing {
    /// Extract `total` and `rows`, ignoring anything else in the body.
    pub fn from_json(body: &serde_json::Value) -> Self {
        Self {
            total: body.get("total").and_then(serde_json::Value::as_u64),
            rows: body
                .get("rows")
                .and_then(serde_json::Value::as_array)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

async fn read_listing(response: reqwest::Response) -> Result<Listing> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Status(status));
    }
    let body: serde_json::Value = response.json().await?;
    Ok(Listing::from_json(&body))
}

/// Pull `code` and `message` out of a JSON reply.
///
/// Only a JSON integer counts as a code. A string such as `"0"` is left for
/// the message rules, so it can never be mistaken for success.
pub fn parse_reply(body: &serde_json::Value) -> RawResult {
    let code = body.get("code").and_then(serde_json::Value::as_i64);
    let message = body
        .get("message")
        .filter(|m| !m.is_null())
        .map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string()));
    RawResult::Reply { code, message }
}

#[async_trait]
impl Reserve for HttpReserver {
    async fn attempt(&self, key: &TaskKey, ctx: &AttemptContext) -> RawResult {
        match self.send(key, ctx).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(task = %key, error = %e, "reservation request failed");
                RawResult::transport_failure(e.to_string())
            }
        }
    }
}
