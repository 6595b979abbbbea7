//! Read-only ledger client for a blockchain explorer API

use async_trait::async_trait;
use escrow_engine::{LedgerError, LedgerQuery};
use escrow_types::{Amount, UnspentRecord};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Lists unspent records through `GET {api}/boxes/unspent/byAddress/{address}`
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    client: reqwest::Client,
    base_url: String,
}

impl ExplorerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn unspent_url(&self, address: &str) -> String {
        format!("{}/boxes/unspent/byAddress/{}", self.base_url, address)
    }
}

#[async_trait]
impl LedgerQuery for ExplorerClient {
    async fn list_unspent_records(&self, address: &str) -> Result<Vec<UnspentRecord>, LedgerError> {
        let url = self.unspent_url(address);
        tracing::debug!(url = %url, "querying explorer");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Unavailable(format!(
                "explorer returned {}",
                status
            )));
        }

        let page: UnspentPage = response
            .json()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("invalid explorer response: {}", e)))?;

        Ok(page.into_records())
    }
}

/// Explorer response body
#[derive(Debug, Deserialize)]
pub struct UnspentPage {
    #[serde(default)]
    pub items: Vec<ExplorerBox>,
}

impl UnspentPage {
    pub fn into_records(self) -> Vec<UnspentRecord> {
        self.items.into_iter().map(UnspentRecord::from).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerBox {
    pub box_id: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub value: u64,
    #[serde(default)]
    pub creation_height: u64,
    #[serde(default)]
    pub additional_registers: BTreeMap<String, ExplorerRegister>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerRegister {
    #[serde(default)]
    pub rendered_value: Option<String>,
}

impl From<ExplorerBox> for UnspentRecord {
    fn from(item: ExplorerBox) -> Self {
        let mut record = UnspentRecord::new(item.box_id, Amount::new(item.value), item.creation_height);
        for (name, register) in item.additional_registers {
            if let Some(value) = register.rendered_value {
                record = record.with_register(name, value);
            }
        }
        record
    }
}
