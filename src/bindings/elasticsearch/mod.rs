//! Purpose: Elasticsearch binding speaking the REST API over blocking HTTP.
//! Exports: `ElasticsearchDb`, `ElasticsearchConfig`, `UpdateMode`.
//! Role: Maps the CRUD contract onto document index/get/update/delete/search calls.
//! Invariants: One index holds every table; the table name is not part of the document address.
//! Invariants: The record key is duplicated into a keyword field so scans can range over it.
//! Invariants: Scans only see documents made visible by a refresh (near-real-time search).
#![allow(clippy::result_large_err)]

mod rest;

use super::{Db, not_initialized};
use crate::core::error::{Error, ErrorKind};
use crate::core::props::Properties;
use crate::core::record::{FieldSet, FieldValue, Fields, ScanRecord, project};
use rest::RestClient;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;

const DEFAULT_HOSTS: &str = "localhost:9200";
const DEFAULT_INDEX: &str = "es.ycsb";
const DEFAULT_KEY_FIELD: &str = "ycsb_key";
const SETTING_PREFIX: &str = "es.setting.";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateMode {
    /// Native `_update` with a partial document.
    Partial,
    /// GET, merge client-side, PUT back. Not atomic.
    Merge,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElasticsearchConfig {
    pub hosts: String,
    pub scheme: String,
    pub index: String,
    pub shards: u32,
    pub replicas: u32,
    pub new_db: bool,
    pub cluster_name: Option<String>,
    pub credentials: Option<(String, String)>,
    pub settings: Vec<(String, String)>,
    pub refresh: Option<String>,
    pub update_mode: UpdateMode,
    pub key_field: String,
    pub health_status: String,
    pub health_timeout: String,
    pub timeout: Duration,
}

impl ElasticsearchConfig {
    pub fn from_props(props: &Properties) -> Result<Self, Error> {
        let refresh = match props.get_or("es.refresh", "false").trim() {
            "false" | "" => None,
            value @ ("true" | "wait_for") => Some(value.to_string()),
            other => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("invalid es.refresh `{other}`"))
                    .with_hint("Use false, true, or wait_for."));
            }
        };
        let update_mode = match props.get_or("es.update.mode", "partial").trim() {
            "partial" => UpdateMode::Partial,
            "merge" => UpdateMode::Merge,
            other => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("invalid es.update.mode `{other}`"))
                    .with_hint("Use partial or merge."));
            }
        };
        let credentials = match (props.get("es.username"), props.get("es.password")) {
            (Some(user), password) => Some((user.to_string(), password.unwrap_or_default().to_string())),
            (None, Some(_)) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("es.password requires es.username"));
            }
            (None, None) => None,
        };
        let index = props.get_or("es.index.key", DEFAULT_INDEX).trim().to_string();
        if index.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("es.index.key must not be empty"));
        }
        let key_field = props.get_or("es.key.field", DEFAULT_KEY_FIELD).trim().to_string();
        if key_field.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("es.key.field must not be empty"));
        }

        Ok(Self {
            hosts: props.get_or("es.hosts.list", DEFAULT_HOSTS).to_string(),
            scheme: props.get_or("es.scheme", "http").trim().to_string(),
            index,
            shards: props.parse_or("es.number_of_shards", 1)?,
            replicas: props.parse_or("es.number_of_replicas", 0)?,
            new_db: props.bool_or("es.newdb", false)?,
            cluster_name: props.get("cluster.name").map(str::to_string),
            credentials,
            settings: props
                .with_prefix(SETTING_PREFIX)
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            refresh,
            update_mode,
            key_field,
            health_status: props.get_or("es.health.wait_for_status", "green").to_string(),
            health_timeout: props.get_or("es.health.timeout", "30s").to_string(),
            timeout: props.millis_or("es.timeout.ms", 30_000)?,
        })
    }

    /// Body for `PUT /{index}`: shard/replica counts, passthrough settings, key mapping.
    pub fn create_index_body(&self) -> Value {
        let mut settings = Map::new();
        settings.insert("index.number_of_shards".to_string(), json!(self.shards));
        settings.insert("index.number_of_replicas".to_string(), json!(self.replicas));
        for (name, value) in &self.settings {
            settings.insert(name.clone(), json!(value));
        }
        json!({
            "settings": settings,
            "mappings": {
                "properties": {
                    self.key_field.as_str(): {"type": "keyword"}
                }
            }
        })
    }
}

struct Connection {
    client: RestClient,
    config: ElasticsearchConfig,
}

impl Connection {
    fn write_query(&self) -> Vec<(&str, &str)> {
        match &self.config.refresh {
            Some(refresh) => vec![("refresh", refresh.as_str())],
            None => Vec::new(),
        }
    }

    fn document(&self, key: &str, values: &Fields) -> Result<Map<String, Value>, Error> {
        let mut doc = Map::new();
        for (name, value) in values {
            if *name == self.config.key_field {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("field `{name}` collides with the key field"))
                    .with_hint("Pick another es.key.field."));
            }
            doc.insert(name.clone(), Value::String(value.to_text()));
        }
        doc.insert(self.config.key_field.clone(), Value::String(key.to_string()));
        Ok(doc)
    }

    fn fields_from_source(&self, source: Map<String, Value>) -> Fields {
        source
            .into_iter()
            .filter(|(name, _)| *name != self.config.key_field)
            .filter_map(|(name, value)| match value {
                Value::String(text) => Some((name, FieldValue::from(text))),
                Value::Null => None,
                other => Some((name, FieldValue::from(other.to_string()))),
            })
            .collect()
    }

    fn get_source(&self, key: &str) -> Result<Map<String, Value>, Error> {
        let response: GetResponse = self.client.get_json(&[self.config.index.as_str(), "_doc", key], &[])?;
        if !response.found {
            return Err(Error::new(ErrorKind::NotFound).with_message("document not found"));
        }
        Ok(response.source.unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct HealthResponse {
    #[serde(default)]
    cluster_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    timed_out: bool,
}

#[derive(Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    result: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Option<Map<String, Value>>,
}

#[derive(Default)]
pub struct ElasticsearchDb {
    connection: Option<Connection>,
}

impl ElasticsearchDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection(&self) -> Result<&Connection, Error> {
        self.connection
            .as_ref()
            .ok_or_else(|| not_initialized("elasticsearch"))
    }
}

impl Db for ElasticsearchDb {
    fn init(&mut self, props: &Properties) -> Result<(), Error> {
        let config = ElasticsearchConfig::from_props(props)?;
        let hosts = rest::parse_hosts(&config.hosts, &config.scheme)?;
        let mut client = RestClient::new(hosts, config.timeout)?;
        if let Some((user, password)) = &config.credentials {
            client = client.with_basic_auth(user, password);
        }
        tracing::debug!(
            hosts = %config.hosts,
            index = %config.index,
            "connecting elasticsearch binding"
        );

        let exists = client.exists(&[config.index.as_str()])?;
        if exists && config.new_db {
            tracing::info!(index = %config.index, "dropping existing index");
            let _: Value = client.delete_json(&[config.index.as_str()], &[])?;
        }
        if !exists || config.new_db {
            tracing::info!(
                index = %config.index,
                shards = config.shards,
                replicas = config.replicas,
                "creating index"
            );
            let _: Value = client.send_json("PUT", &[config.index.as_str()], &[], &config.create_index_body())?;
        }

        let health: HealthResponse = client.get_json(
            &["_cluster", "health", config.index.as_str()],
            &[
                ("wait_for_status", config.health_status.as_str()),
                ("timeout", config.health_timeout.as_str()),
            ],
        )?;
        if health.timed_out {
            return Err(Error::new(ErrorKind::Backend)
                .with_message(format!(
                    "cluster did not reach {} status (currently {})",
                    config.health_status,
                    health.status.as_deref().unwrap_or("unknown")
                ))
                .with_hint("Check es.number_of_replicas against the number of data nodes."));
        }
        if let Some(expected) = &config.cluster_name {
            let actual = health.cluster_name.as_deref().unwrap_or_default();
            if actual != expected {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!(
                        "connected to cluster `{actual}` but cluster.name is `{expected}`"
                    )));
            }
        }

        self.connection = Some(Connection { client, config });
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), Error> {
        if self.connection.take().is_some() {
            tracing::debug!("elasticsearch binding closed");
        }
        Ok(())
    }

    fn insert(&self, table: &str, key: &str, values: &Fields) -> Result<(), Error> {
        let conn = self.connection()?;
        let doc = conn.document(key, values).map_err(|err| err.at(table, key))?;
        let _: Value = conn
            .client
            .send_json(
                "PUT",
                &[conn.config.index.as_str(), "_doc", key],
                &conn.write_query(),
                &doc,
            )
            .map_err(|err| err.at(table, key))?;
        Ok(())
    }

    fn read(&self, table: &str, key: &str, fields: Option<&FieldSet>) -> Result<Fields, Error> {
        let conn = self.connection()?;
        let source = conn.get_source(key).map_err(|err| err.at(table, key))?;
        Ok(project(conn.fields_from_source(source), fields))
    }

    fn update(&self, table: &str, key: &str, values: &Fields) -> Result<(), Error> {
        let conn = self.connection()?;
        match conn.config.update_mode {
            UpdateMode::Partial => {
                let mut doc = conn.document(key, values).map_err(|err| err.at(table, key))?;
                doc.remove(&conn.config.key_field);
                let _: Value = conn
                    .client
                    .send_json(
                        "POST",
                        &[conn.config.index.as_str(), "_update", key],
                        &conn.write_query(),
                        &json!({ "doc": doc }),
                    )
                    .map_err(|err| err.at(table, key))?;
            }
            UpdateMode::Merge => {
                let mut source = conn.get_source(key).map_err(|err| err.at(table, key))?;
                let overlay = conn.document(key, values).map_err(|err| err.at(table, key))?;
                source.extend(overlay);
                let _: Value = conn
                    .client
                    .send_json(
                        "PUT",
                        &[conn.config.index.as_str(), "_doc", key],
                        &conn.write_query(),
                        &source,
                    )
                    .map_err(|err| err.at(table, key))?;
            }
        }
        Ok(())
    }

    fn delete(&self, table: &str, key: &str) -> Result<(), Error> {
        let conn = self.connection()?;
        let response: DeleteResponse = conn
            .client
            .delete_json(&[conn.config.index.as_str(), "_doc", key], &conn.write_query())
            .map_err(|err| err.at(table, key))?;
        if response.result.as_deref() == Some("not_found") {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("document not found")
                .at(table, key));
        }
        Ok(())
    }

    fn scan(
        &self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&FieldSet>,
    ) -> Result<Vec<ScanRecord>, Error> {
        let conn = self.connection()?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let key_field = conn.config.key_field.as_str();
        let body = json!({
            "size": count,
            "query": {"range": {key_field: {"gte": start_key}}},
            "sort": [{key_field: "asc"}]
        });
        let response: SearchResponse = conn
            .client
            .send_json("POST", &[conn.config.index.as_str(), "_search"], &[], &body)
            .map_err(|err| err.at(table, start_key))?;
        Ok(response
            .hits
            .hits
            .into_iter()
            .take(count)
            .map(|hit| ScanRecord {
                key: hit.id,
                fields: project(conn.fields_from_source(hit.source.unwrap_or_default()), fields),
            })
            .collect())
    }
}
