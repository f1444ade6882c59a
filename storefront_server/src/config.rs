use std::{collections::HashMap, env};

use chrono::Duration;
use log::*;
use storefront_common::{parse_boolean_flag, Secret};
use storefront_engine::db_types::Chain;

const DEFAULT_SFS_HOST: &str = "127.0.0.1";
const DEFAULT_SFS_PORT: u16 = 8480;
const DEFAULT_INVOICE_TTL: Duration = Duration::hours(1);
const DEFAULT_EXPIRY_INTERVAL_SECS: u64 = 60;
const DEFAULT_MIN_CONFIRMATIONS: i64 = 3;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Extended public keys per chain. Invoice issuance on a chain with no key configured fails hard.
    pub xpubs: HashMap<Chain, String>,
    /// How long a freshly issued invoice stays payable.
    pub invoice_ttl: Duration,
    /// Relative payment amount tolerance. `None` uses the engine default (0.5%).
    pub payment_tolerance: Option<f64>,
    /// Seconds between invoice expiry sweeps.
    pub expiry_interval_secs: u64,
    /// Whether this instance runs the expiry sweep. When several instances share one database, only one should.
    pub run_expiry_worker: bool,
    /// Base URL of the block explorer aggregator used to verify incoming transactions.
    pub explorer_url: String,
    /// Optional API key for the explorer aggregator.
    pub explorer_api_key: Secret<String>,
    /// Confirmations needed before a transaction is treated as final.
    pub min_confirmations: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SFS_HOST.to_string(),
            port: DEFAULT_SFS_PORT,
            database_url: String::default(),
            xpubs: HashMap::new(),
            invoice_ttl: DEFAULT_INVOICE_TTL,
            payment_tolerance: None,
            expiry_interval_secs: DEFAULT_EXPIRY_INTERVAL_SECS,
            run_expiry_worker: true,
            explorer_url: String::default(),
            explorer_api_key: Secret::default(),
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SFS_HOST").ok().unwrap_or_else(|| DEFAULT_SFS_HOST.into());
        let port = env::var("SFS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!("🪛️ {s} is not a valid port for SFS_PORT. {e} Using the default, {DEFAULT_SFS_PORT}, instead.");
                    DEFAULT_SFS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SFS_PORT);
        let database_url = env::var("SF_DATABASE_URL").unwrap_or_else(|_| {
            error!("🪛️ SF_DATABASE_URL is not set. Using the default, which is probably not what you want.");
            String::default()
        });
        let invoice_ttl = env::var("SFS_INVOICE_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Duration::seconds)
            .unwrap_or(DEFAULT_INVOICE_TTL);
        let payment_tolerance = env::var("SFS_PAYMENT_TOLERANCE").ok().and_then(|s| {
            s.parse::<f64>()
                .map_err(|e| {
                    error!("🪛️ {s} is not a valid value for SFS_PAYMENT_TOLERANCE. {e} Using the engine default.");
                    e
                })
                .ok()
        });
        let expiry_interval_secs = env::var("SFS_EXPIRY_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_EXPIRY_INTERVAL_SECS);
        let run_expiry_worker = parse_boolean_flag(env::var("SFS_RUN_EXPIRY_WORKER").ok(), true);
        let explorer_url = env::var("SFS_EXPLORER_URL").unwrap_or_else(|_| {
            warn!("🪛️ SFS_EXPLORER_URL is not set. Payment verification will fail until it is configured.");
            String::default()
        });
        let explorer_api_key = Secret::new(env::var("SFS_EXPLORER_API_KEY").unwrap_or_default());
        let min_confirmations = env::var("SFS_MIN_CONFIRMATIONS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(DEFAULT_MIN_CONFIRMATIONS);
        Self {
            host,
            port,
            database_url,
            xpubs: xpubs_from_env(),
            invoice_ttl,
            payment_tolerance,
            expiry_interval_secs,
            run_expiry_worker,
            explorer_url,
            explorer_api_key,
            min_confirmations,
        }
    }

    pub fn xpub_for(&self, chain: Chain) -> Option<&str> {
        self.xpubs.get(&chain).map(|s| s.as_str())
    }
}

/// Reads `SFS_XPUB_BTC`, `SFS_XPUB_ETH`, and so on. A chain with no key simply cannot be invoiced on.
fn xpubs_from_env() -> HashMap<Chain, String> {
    let mut xpubs = HashMap::new();
    for chain in Chain::all() {
        let var = format!("SFS_XPUB_{}", chain.symbol());
        match env::var(&var) {
            Ok(xpub) if !xpub.trim().is_empty() => {
                xpubs.insert(chain, xpub);
            },
            _ => {
                info!("🪛️ {var} is not set. Invoicing on {chain} is disabled.");
            },
        }
    }
    xpubs
}
