use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use super::{Connection, JourneyLookup, JourneyQuery};

const MAX_CONNECTIONS: &str = "4";
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Connections endpoint client with a request timeout and bounded retries.
pub struct HttpJourneyLookup {
    client: Client,
    base_url: Url,
    retries: u32,
}

impl HttpJourneyLookup {
    pub fn new(base_url: &str, timeout: Duration, retries: u32) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build journey http client")?;
        let mut base_url = Url::parse(base_url).context("parse JOURNEY_API_URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            retries,
        })
    }

    fn endpoint(&self) -> anyhow::Result<Url> {
        self.base_url.join("connections").context("join connections path")
    }

    async fn fetch_once(&self, query: &JourneyQuery) -> anyhow::Result<Vec<Connection>> {
        let date = query.date.to_string();
        let resp = self
            .client
            .get(self.endpoint()?)
            .bearer_auth(&query.token)
            .query(&[
                ("from", query.departure_city.as_str()),
                ("to", query.arrival_city.as_str()),
                ("date", date.as_str()),
                ("limit", MAX_CONNECTIONS),
            ])
            .send()
            .await
            .context("journey request")?
            .error_for_status()
            .context("journey status")?;
        let body: ConnectionsResponse = resp.json().await.context("journey body")?;
        Ok(simplify(body))
    }
}

#[async_trait]
impl JourneyLookup for HttpJourneyLookup {
    async fn connections(&self, query: &JourneyQuery) -> anyhow::Result<Vec<Connection>> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(query).await {
                Ok(list) => return Ok(list),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    debug!(error = %e, attempt, "journey lookup retry");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionsResponse {
    #[serde(default)]
    connections: Vec<ConnectionDto>,
}

#[derive(Debug, Deserialize)]
struct ConnectionDto {
    from: StopDto,
    to: StopDto,
    duration: Option<String>,
    transfers: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StopDto {
    station: Option<StationDto>,
    departure: Option<String>,
    arrival: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StationDto {
    name: Option<String>,
}

fn station_name(stop: &StopDto) -> String {
    stop.station
        .as_ref()
        .and_then(|s| s.name.clone())
        .unwrap_or_else(|| "?".into())
}

fn simplify(body: ConnectionsResponse) -> Vec<Connection> {
    body.connections
        .into_iter()
        .map(|c| Connection {
            from: station_name(&c.from),
            to: station_name(&c.to),
            departure: c.from.departure,
            arrival: c.to.arrival,
            duration: c.duration,
            transfers: c.transfers,
        })
        .collect()
}
