use std::collections::HashMap;
use std::time::Duration;

use config::shared::ClusterConfig;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::conversions::AggregateValue;
use crate::destination::{BulkItemFailure, BulkWriteReport, CHANNEL_FIELD, SearchIndex};
use crate::error::{ErrorKind, EtlResult};
use crate::{bail, etl_error};

/// Document type that maps to the typeless endpoints of current clusters.
const DEFAULT_DOC_TYPE: &str = "_doc";
const MAX_AGGREGATION: &str = "max_value";
const INDEX_EXISTS_ERROR: &str = "resource_already_exists_exception";

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, BulkResponseItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkResponseItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    aggregations: HashMap<String, MaxAggregation>,
}

#[derive(Debug, Deserialize)]
struct MaxAggregation {
    value: Option<f64>,
    value_as_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: Option<Value>,
}

/// HTTP client for an Elasticsearch compatible cluster.
///
/// Bulk writes wait for a refresh so that aggregates of the next fetch cycle see them.
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<SecretString>,
}

impl ElasticsearchClient {
    pub fn new(config: &ClusterConfig) -> EtlResult<Self> {
        let base_url = Url::parse(&config.url).map_err(|err| {
            etl_error!(
                ErrorKind::ConfigError,
                "Search cluster URL is invalid",
                format!("{}: {err}", config.url)
            )
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> EtlResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                etl_error!(
                    ErrorKind::ConfigError,
                    "Search cluster URL cannot have a path",
                    self.base_url.as_str()
                )
            })?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.username {
            Some(username) => request.basic_auth(
                username,
                self.password.as_ref().map(|password| password.expose_secret()),
            ),
            None => request,
        }
    }

    /// Sends `request` and returns its JSON body. A 404 answer is an error.
    async fn send(&self, request: RequestBuilder, action: &'static str) -> EtlResult<Value> {
        match self.send_optional(request, action).await? {
            Some(body) => Ok(body),
            None => bail!(
                ErrorKind::DestinationQueryFailed,
                "Search cluster has no such resource",
                format!("{action} responded with {}", StatusCode::NOT_FOUND)
            ),
        }
    }

    /// Sends `request` and returns its JSON body, `None` when the cluster answers 404.
    async fn send_optional(
        &self,
        request: RequestBuilder,
        action: &'static str,
    ) -> EtlResult<Option<Value>> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            bail!(
                ErrorKind::DestinationQueryFailed,
                "Search cluster rejected the request",
                format!("{action} responded with {status} and body `{body}`")
            );
        }

        if body.is_empty() {
            return Ok(Some(Value::Null));
        }

        Ok(Some(serde_json::from_str(&body)?))
    }

    /// Documents are addressed through the typeless `_doc` endpoint, whatever their type.
    fn document_segments<'a>(index: &'a str, id: &'a str) -> [&'a str; 3] {
        [index, DEFAULT_DOC_TYPE, id]
    }
}

impl SearchIndex for ElasticsearchClient {
    fn name() -> &'static str {
        "elasticsearch"
    }

    async fn ensure_index_and_mapping(
        &self,
        index: &str,
        doc_type: &str,
        mapping: Option<&Value>,
    ) -> EtlResult<()> {
        let response = self
            .request(Method::PUT, self.url(&[index])?)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            if !body.contains(INDEX_EXISTS_ERROR) {
                bail!(
                    ErrorKind::DestinationQueryFailed,
                    "Search index could not be created",
                    format!("index {index} responded with {status} and body `{body}`")
                );
            }
        } else {
            info!(index, "created search index");
        }

        if let Some(mapping) = mapping {
            debug!(index, doc_type, %mapping, "putting index mapping");
            let request = self
                .request(Method::PUT, self.url(&[index, "_mapping"])?)
                .json(mapping);
            self.send(request, "put mapping").await?;
        }

        Ok(())
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        doc_type: &str,
        documents: Vec<(String, Value)>,
    ) -> EtlResult<BulkWriteReport> {
        if documents.is_empty() {
            return Ok(BulkWriteReport::default());
        }

        let mut body = String::new();
        for (id, document) in &documents {
            let mut action = json!({ "_index": index, "_id": id });
            if doc_type != DEFAULT_DOC_TYPE {
                action["_type"] = Value::String(doc_type.to_string());
            }
            body.push_str(&json!({ "index": action }).to_string());
            body.push('\n');
            body.push_str(&serde_json::to_string(document)?);
            body.push('\n');
        }

        let mut url = self.url(&["_bulk"])?;
        url.set_query(Some("refresh=wait_for"));
        let request = self
            .request(Method::POST, url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);

        let response = self.send(request, "bulk").await?;
        let response: BulkResponse = serde_json::from_value(response)?;

        let mut report = BulkWriteReport::default();
        for (position, item) in response.items.into_iter().enumerate() {
            let Some(result) = item.into_values().next() else {
                continue;
            };
            match result.error {
                Some(error) => report.failures.push(BulkItemFailure {
                    id: result
                        .id
                        .or_else(|| documents.get(position).map(|(id, _)| id.clone()))
                        .unwrap_or_default(),
                    reason: error
                        .get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string()),
                }),
                None => report.written += 1,
            }
        }

        Ok(report)
    }

    async fn max_aggregate(
        &self,
        index: &str,
        doc_type: &str,
        channel: &str,
        field_path: &str,
    ) -> EtlResult<Option<AggregateValue>> {
        let query = json!({
            "size": 0,
            "query": { "bool": { "filter": [ { "term": { CHANNEL_FIELD: channel } } ] } },
            "aggs": { MAX_AGGREGATION: { "max": { "field": field_path } } },
        });
        debug!(index, doc_type, %query, "searching max aggregate");

        let request = self
            .request(Method::POST, self.url(&[index, "_search"])?)
            .json(&query);
        let Some(response) = self.send_optional(request, "max aggregate").await? else {
            return Ok(None);
        };
        let mut response: SearchResponse = serde_json::from_value(response)?;

        let Some(aggregation) = response.aggregations.remove(MAX_AGGREGATION) else {
            return Ok(None);
        };

        Ok(aggregation.value.map(|value| AggregateValue {
            value,
            value_as_string: aggregation.value_as_string,
        }))
    }

    async fn get_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> EtlResult<Option<Value>> {
        debug!(index, doc_type, id, "getting document");
        let url = self.url(&Self::document_segments(index, id))?;
        let request = self.request(Method::GET, url);
        let Some(response) = self.send_optional(request, "get document").await? else {
            return Ok(None);
        };
        let response: GetResponse = serde_json::from_value(response)?;

        Ok(response.found.then_some(response.source).flatten())
    }

    async fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        document: Value,
    ) -> EtlResult<()> {
        debug!(index, doc_type, id, "putting document");
        let mut url = self.url(&Self::document_segments(index, id))?;
        url.set_query(Some("refresh=wait_for"));
        let request = self.request(Method::PUT, url).json(&document);
        self.send(request, "put document").await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serves every request with an empty `404 Not Found` and returns the cluster URL.
    async fn not_found_cluster() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buffer = [0u8; 4096];
                    while let Ok(read) = stream.read(&mut buffer).await {
                        if read == 0 {
                            break;
                        }
                        request.extend_from_slice(&buffer[..read]);
                        if request_complete(&request) {
                            break;
                        }
                    }
                    let _ = stream
                        .write_all(
                            b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        )
                        .await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        format!("http://{address}")
    }

    fn request_complete(request: &[u8]) -> bool {
        let Some(header_end) = request.windows(4).position(|window| window == b"\r\n\r\n")
        else {
            return false;
        };
        let headers = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        request.len() >= header_end + 4 + content_length
    }

    fn cluster(url: &str) -> ClusterConfig {
        ClusterConfig {
            url: url.to_string(),
            username: None,
            password: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn document_urls_escape_their_segments() {
        let client = ElasticsearchClient::new(&cluster("http://localhost:9200/")).unwrap();

        let url = client
            .url(&ElasticsearchClient::document_segments(
                "etlconfig_",
                "orders eu",
            ))
            .unwrap();

        assert_eq!(
            url.as_str(),
            "http://localhost:9200/etlconfig_/_doc/orders%20eu"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn writes_answered_with_not_found_fail() {
        let client = ElasticsearchClient::new(&cluster(&not_found_cluster().await)).unwrap();

        let err = client
            .put_document("etlconfig_", "channels_", "orders", json!({ "name": "orders" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);

        let err = client
            .bulk_upsert("orders", "_doc", vec![("1".to_string(), json!({}))])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reads_answered_with_not_found_are_empty() {
        let client = ElasticsearchClient::new(&cluster(&not_found_cluster().await)).unwrap();

        let document = client
            .get_document("etlconfig_", "channels_", "orders")
            .await
            .unwrap();
        assert!(document.is_none());

        let aggregate = client
            .max_aggregate("orders", "_doc", "orders", "placedDate")
            .await
            .unwrap();
        assert!(aggregate.is_none());
    }

    #[test]
    fn invalid_urls_are_configuration_errors() {
        let err = ElasticsearchClient::new(&cluster("not a url")).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn bulk_responses_decode_item_failures() {
        let response: BulkResponse = serde_json::from_value(json!({
            "errors": true,
            "items": [
                { "index": { "_id": "1", "status": 200 } },
                { "index": { "_id": "2", "status": 400, "error": { "type": "mapper_parsing_exception", "reason": "failed to parse" } } },
            ],
        }))
        .unwrap();

        assert!(response.items[0]["index"].error.is_none());
        assert_eq!(
            response.items[1]["index"].error.as_ref().unwrap()["reason"],
            "failed to parse"
        );
    }
}
