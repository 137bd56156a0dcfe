use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::directory::{DirectoryEntry, DirectorySource};
use crate::domain::{ExchangeSegment, DOMESTIC_CODE_WIDTH};
use crate::error::SourceError;
use crate::http_client::{HttpClient, HttpRequest};

const KRX_JSON_ENDPOINT: &str = "https://data.krx.co.kr/comm/bldAttendant/getJsonData.cmd";
const KRX_REFERER: &str = "https://data.krx.co.kr/contents/MDC/MDI/mdiLoader/index.cmd";
const LISTING_BLD: &str = "dbms/MDC/STAT/standard/MDCSTAT01901";

/// Exchange listing table from the KRX market data service.
pub struct KrxDirectorySource {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
}

impl KrxDirectorySource {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            endpoint: String::from(KRX_JSON_ENDPOINT),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

const fn market_id(segment: ExchangeSegment) -> Option<&'static str> {
    match segment {
        ExchangeSegment::Kospi => Some("STK"),
        ExchangeSegment::Kosdaq => Some("KSQ"),
        ExchangeSegment::Overseas => None,
    }
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(rename = "OutBlock_1", default)]
    rows: Vec<ListingRow>,
}

#[derive(Debug, Deserialize)]
struct ListingRow {
    #[serde(rename = "ISU_SRT_CD", default)]
    short_code: String,
    #[serde(rename = "ISU_ABBRV", default)]
    short_name: String,
}

fn parse_listing(body: &str, segment: ExchangeSegment) -> Result<Vec<DirectoryEntry>, SourceError> {
    let response: ListingResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::internal(format!("malformed KRX listing: {e}")))?;

    Ok(response
        .rows
        .into_iter()
        .filter(|row| {
            row.short_code.len() == DOMESTIC_CODE_WIDTH && !row.short_name.trim().is_empty()
        })
        .map(|row| DirectoryEntry::new(row.short_code, row.short_name.trim(), segment))
        .collect())
}

impl DirectorySource for KrxDirectorySource {
    fn load_segment<'a>(
        &'a self,
        segment: ExchangeSegment,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DirectoryEntry>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let market = market_id(segment).ok_or_else(|| {
                SourceError::invalid_request(format!("{segment} has no KRX listing"))
            })?;

            let request = HttpRequest::post(&self.endpoint)
                .with_header("referer", KRX_REFERER)
                .with_form(&[
                    ("bld", LISTING_BLD),
                    ("locale", "ko_KR"),
                    ("mktId", market),
                    ("share", "1"),
                    ("csvxls_isNo", "false"),
                ])
                .with_timeout_ms(30_000);

            let response = self
                .http_client
                .execute(request)
                .await
                .map_err(|e| SourceError::unavailable(format!("KRX listing request failed: {e}")))?;

            if !response.is_success() {
                return Err(SourceError::unavailable(format!(
                    "KRX listing returned status {}",
                    response.status
                )));
            }

            parse_listing(&response.body, segment)
        })
    }
}
