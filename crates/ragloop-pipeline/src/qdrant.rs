use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, ListValue, PointStruct, QueryPointsBuilder, Struct,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use ragloop_core::RetrievedHit;
use ragloop_error::{RagError, Result};
use tracing::{info, instrument};

use crate::index::VectorIndex;

/// Qdrant 向量索引适配器
///
/// 载荷固定两个字段：text 存块文本，metadata 存合并后的元数据。
/// collection 采用余弦距离，分数天然满足越大越相似。
pub struct QdrantIndex {
    client: Qdrant,
    collection_name: String,
}

impl QdrantIndex {
    /// 连接 Qdrant，collection 不存在则按配置维度创建
    pub async fn new(url: &str, collection_name: &str, dimension: u64) -> Result<Self> {
        let client = Qdrant::from_url(url).build()?;

        if !client.collection_exists(collection_name).await? {
            client
                .create_collection(
                    CreateCollectionBuilder::new(collection_name).vectors_config(
                        VectorParamsBuilder::new(dimension, Distance::Cosine).build(),
                    ),
                )
                .await?;
            info!("Created Qdrant collection: {}", collection_name);
        }

        Ok(Self {
            client,
            collection_name: collection_name.to_string(),
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    #[instrument(skip(self, ids, vectors, texts, metadatas))]
    async fn insert(
        &self,
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
        texts: Vec<String>,
        metadatas: Vec<serde_json::Value>,
    ) -> Result<()> {
        let points: Vec<PointStruct> = ids
            .into_iter()
            .zip(vectors)
            .zip(texts)
            .zip(metadatas)
            .map(|(((id, vector), text), metadata)| {
                let mut payload = Payload::new();
                payload.insert("text", QdrantValue {
                    kind: Some(Kind::StringValue(text)),
                });
                payload.insert("metadata", json_to_qdrant(metadata));
                PointStruct::new(id, vector, payload)
            })
            .collect();

        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points).wait(true))
            .await?;

        info!(
            collection = %self.collection_name,
            points = count,
            "Upserted points into Qdrant"
        );
        Ok(())
    }

    #[instrument(skip(self, vector))]
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedHit>> {
        let response = self
            .client
            .query(
                QueryPointsBuilder::new(&self.collection_name)
                    .query(vector.to_vec())
                    .limit(top_k as u64)
                    .with_payload(true),
            )
            .await?;

        let hits = response
            .result
            .into_iter()
            .map(|point| {
                let mut payload = point.payload;
                let text = match payload.remove("text").map(qdrant_to_json) {
                    Some(serde_json::Value::String(s)) => s,
                    _ => String::new(),
                };
                let metadata = payload
                    .remove("metadata")
                    .map(qdrant_to_json)
                    .unwrap_or(serde_json::Value::Null);
                RetrievedHit {
                    text,
                    score: point.score,
                    metadata,
                }
            })
            .collect();

        Ok(hits)
    }
}

/// serde_json -> qdrant 载荷值
fn json_to_qdrant(value: serde_json::Value) -> QdrantValue {
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Kind::IntegerValue(i)
            } else {
                Kind::DoubleValue(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Kind::StringValue(s),
        serde_json::Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_qdrant).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .into_iter()
                .map(|(key, val)| (key, json_to_qdrant(val)))
                .collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

/// qdrant 载荷值 -> serde_json
fn qdrant_to_json(value: QdrantValue) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Value::from(d),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(qdrant_to_json).collect())
        }
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .map(|(key, val)| (key, qdrant_to_json(val)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_value_conversion_preserves_nested_metadata() {
        let metadata = json!({
            "source": "report.pdf",
            "chunk_index": 3,
            "char_count": 120,
            "document_id": "7b4bb1fc-3f5e-4d21-9f0a-1f62b7f2a111",
            "tags": ["finance", "q3"]
        });

        let converted = qdrant_to_json(json_to_qdrant(metadata.clone()));
        assert_eq!(converted, metadata);
    }
}
