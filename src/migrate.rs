//! Batch migration controller.
//!
//! Drives one legacy record at a time through existence check, brand
//! resolution, extraction, image ingestion, document synthesis and the final
//! create. Per-record failures are logged and counted, never fatal; the
//! batch always runs to the end.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::assets::AssetIngest;
use crate::brand::resolve_brand;
use crate::document::{synthesize, CategoryConfig, ProductImage};
use crate::store::ContentStore;
use crate::util::env::env_parse;
use std::time::Duration;

/// Images re-hosted per record are capped; a soft cost control, not a
/// format constraint.
pub const DEFAULT_MAX_IMAGES: usize = 5;
/// Pause after each created document, a plain throttle against the remote
/// store's rate limits.
pub const DEFAULT_PACING_MS: u64 = 500;

/// Mongo-export `$oid` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyId {
    #[serde(rename = "$oid")]
    pub oid: String,
}

/// Mongo-export `$date` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyDate {
    #[serde(rename = "$date")]
    pub date: DateTime<Utc>,
}

/// One row of the legacy catalog export. Timestamps are metadata only and
/// are not transformed.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyRecord {
    #[serde(rename = "_id", default)]
    pub id: Option<LegacyId>,
    pub name: String,
    pub slug: String,
    #[serde(rename = "markName")]
    pub mark_name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<LegacyDate>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<LegacyDate>,
}

/// Terminal per-record states. `Skipped` is counted apart from both
/// success and failure; re-runs are expected to land everything here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Created(String),
    Skipped,
}

/// End-of-batch counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    pub total: usize,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Sequential migration driver for one product category.
pub struct Migrator<'a> {
    store: &'a dyn ContentStore,
    ingester: &'a dyn AssetIngest,
    category: CategoryConfig,
    max_images: usize,
    pacing: Duration,
}

impl<'a> Migrator<'a> {
    pub fn new(
        store: &'a dyn ContentStore,
        ingester: &'a dyn AssetIngest,
        category: CategoryConfig,
    ) -> Self {
        Self {
            store,
            ingester,
            category,
            max_images: env_parse("MIGRATE_MAX_IMAGES", DEFAULT_MAX_IMAGES),
            pacing: Duration::from_millis(env_parse("MIGRATE_DELAY_MS", DEFAULT_PACING_MS)),
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Process every record, in order, one at a time. Returns the final
    /// counters; already-created documents from earlier runs are skipped.
    pub async fn run(&self, records: &[LegacyRecord]) -> MigrationSummary {
        let mut summary = MigrationSummary {
            total: records.len(),
            ..Default::default()
        };
        info!(
            category = self.category.label,
            records = records.len(),
            "starting migration"
        );

        for record in records {
            match self.migrate_record(record).await {
                Ok(RecordOutcome::Created(id)) => {
                    info!(name = %record.name, document_id = %id, "record migrated");
                    summary.created += 1;
                    sleep(self.pacing).await;
                }
                Ok(RecordOutcome::Skipped) => {
                    summary.skipped += 1;
                }
                Err(err) => {
                    error!(
                        name = %record.name,
                        external_id = record.id.as_ref().map(|i| i.oid.as_str()).unwrap_or("-"),
                        error = ?err,
                        "record migration failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            category = self.category.label,
            total = summary.total,
            created = summary.created,
            skipped = summary.skipped,
            failed = summary.failed,
            "migration finished"
        );
        summary
    }

    /// PENDING -> EXISTS_SKIP | IN_PROGRESS -> DONE for one record; any error
    /// maps to FAILED at the caller.
    async fn migrate_record(&self, record: &LegacyRecord) -> Result<RecordOutcome> {
        let slug = self.category.target_slug(&record.slug);

        let existing = self
            .store
            .query_first(
                &format!(
                    r#"*[_type == "{}" && slug.current == $slug][0]"#,
                    self.category.doc_type
                ),
                &[("slug", slug.as_str())],
            )
            .await
            .context("existence check failed")?;
        if existing.is_some() {
            info!(slug = %slug, "document already exists, skipping");
            return Ok(RecordOutcome::Skipped);
        }

        let brand_id = resolve_brand(self.store, &record.mark_name)
            .await
            .with_context(|| format!("brand resolution failed for {}", record.mark_name))?;

        let images = self.ingest_images(record).await;

        let doc = synthesize(record, &self.category, &brand_id, images);
        let doc_value = serde_json::to_value(&doc).context("document serialization failed")?;
        let id = self
            .store
            .create(doc_value)
            .await
            .context("document create failed")?;
        Ok(RecordOutcome::Created(id))
    }

    /// Up to `max_images` sequential fetch+upload calls. A failed image is
    /// logged and dropped; the record proceeds with whatever uploaded.
    async fn ingest_images(&self, record: &LegacyRecord) -> Vec<ProductImage> {
        let mut images = Vec::new();
        for (i, url) in record.images.iter().take(self.max_images).enumerate() {
            let alt = format!("{} - Obrázek {}", record.name, i + 1);
            match self.ingester.ingest(url, &alt).await {
                Ok(asset_id) => images.push(ProductImage::new(asset_id, alt)),
                Err(err) => {
                    warn!(
                        name = %record.name,
                        url = %url,
                        index = i + 1,
                        error = %err,
                        "image upload failed, continuing with remaining images"
                    );
                }
            }
        }
        images
    }
}

/// Read the legacy export file: a JSON array of records. Any read or parse
/// problem here is a setup error and aborts before the first record.
pub fn load_records(path: &std::path::Path) -> Result<Vec<LegacyRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read legacy export {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("cannot parse legacy export {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{OLD_MOTORS, REFURBISHED_MOTORS};
    use crate::store::{AssetStore, ContentStore};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory double for the document store. Understands the two query
    /// shapes the pipeline issues (brand-by-name, document-by-slug).
    #[derive(Default)]
    struct MemoryStore {
        docs: Mutex<Vec<Value>>,
        next_id: AtomicUsize,
        fail_create_for_name: Option<String>,
    }

    impl MemoryStore {
        fn documents(&self) -> Vec<Value> {
            self.docs.lock().unwrap().clone()
        }

        fn documents_of_type(&self, doc_type: &str) -> Vec<Value> {
            self.documents()
                .into_iter()
                .filter(|d| d["_type"] == doc_type)
                .collect()
        }
    }

    #[async_trait]
    impl ContentStore for MemoryStore {
        async fn query_first(
            &self,
            query: &str,
            params: &[(&str, &str)],
        ) -> anyhow::Result<Option<Value>> {
            let docs = self.docs.lock().unwrap();
            for doc in docs.iter() {
                let doc_type = doc["_type"].as_str().unwrap_or_default();
                if !query.contains(&format!(r#"_type == "{doc_type}""#)) {
                    continue;
                }
                let matches = params.iter().all(|(key, value)| match *key {
                    "name" => doc["name"] == *value,
                    "slug" => doc["slug"]["current"] == *value,
                    _ => false,
                });
                if matches {
                    return Ok(Some(doc.clone()));
                }
            }
            Ok(None)
        }

        async fn create(&self, mut doc: Value) -> anyhow::Result<String> {
            if let Some(fail_name) = &self.fail_create_for_name {
                if doc["name"] == fail_name.as_str() {
                    return Err(anyhow!("simulated store rejection"));
                }
            }
            let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            doc["_id"] = Value::from(id.clone());
            self.docs.lock().unwrap().push(doc);
            Ok(id)
        }
    }

    #[async_trait]
    impl AssetStore for MemoryStore {
        async fn upload_image(&self, _bytes: Bytes, filename: &str) -> anyhow::Result<String> {
            Ok(format!("image-{filename}"))
        }
    }

    /// Ingester double: hands out sequential asset ids, or fails every call.
    #[derive(Default)]
    struct StubIngester {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AssetIngest for StubIngester {
        async fn ingest(&self, _url: &str, _alt: &str) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(anyhow!("simulated fetch failure"))
            } else {
                Ok(format!("image-{n}"))
            }
        }
    }

    fn record(name: &str, slug: &str, price: f64, images: usize) -> LegacyRecord {
        LegacyRecord {
            id: None,
            name: name.to_string(),
            slug: slug.to_string(),
            mark_name: "BMW".to_string(),
            description: "kód motoru: AKL, nájezdem 180000 km".to_string(),
            price,
            images: (0..images)
                .map(|i| format!("https://legacy.example/img-{i}.jpg"))
                .collect(),
            created_at: None,
            updated_at: None,
        }
    }

    fn migrator<'a>(
        store: &'a MemoryStore,
        ingester: &'a StubIngester,
        category: CategoryConfig,
    ) -> Migrator<'a> {
        Migrator::new(store, ingester, category).with_pacing(Duration::ZERO)
    }

    #[tokio::test]
    async fn second_run_skips_everything() {
        let store = MemoryStore::default();
        let ingester = StubIngester::default();
        let records = vec![record("Motor A", "motor-a", 10_000.0, 1)];

        let m = migrator(&store, &ingester, OLD_MOTORS);
        let first = m.run(&records).await;
        assert_eq!(first.created, 1);
        let docs_after_first = store.documents().len();

        let second = m.run(&records).await;
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(store.documents().len(), docs_after_first);
    }

    #[tokio::test]
    async fn image_count_is_capped_at_five() {
        let store = MemoryStore::default();
        let ingester = StubIngester::default();
        let records = vec![record("Motor B", "motor-b", 10_000.0, 8)];

        migrator(&store, &ingester, OLD_MOTORS).run(&records).await;
        let doc = &store.documents_of_type("staryMotor")[0];
        assert_eq!(doc["images"].as_array().unwrap().len(), 5);
        assert_eq!(ingester.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn same_brand_is_created_exactly_once() {
        let store = MemoryStore::default();
        let ingester = StubIngester::default();
        let records = vec![
            record("Motor C", "motor-c", 10_000.0, 0),
            record("Motor D", "motor-d", 10_000.0, 0),
        ];

        migrator(&store, &ingester, OLD_MOTORS).run(&records).await;
        let brands = store.documents_of_type("brand");
        assert_eq!(brands.len(), 1);
        assert_eq!(brands[0]["name"], "BMW");
        assert_eq!(brands[0]["isPopular"], true);

        // Both products reference the one brand document.
        let products = store.documents_of_type("staryMotor");
        assert_eq!(products[0]["brand"]["_ref"], products[1]["brand"]["_ref"]);
    }

    #[tokio::test]
    async fn cross_category_slugs_do_not_collide() {
        let store = MemoryStore::default();
        let ingester = StubIngester::default();
        let records = vec![record("Motor E", "motor-e", 10_000.0, 0)];

        migrator(&store, &ingester, REFURBISHED_MOTORS)
            .run(&records)
            .await;
        let used = migrator(&store, &ingester, OLD_MOTORS).run(&records).await;
        assert_eq!(used.created, 1);
        assert_eq!(used.skipped, 0);

        let refurb = store.documents_of_type("repasovanyMotor");
        let old = store.documents_of_type("staryMotor");
        assert_eq!(refurb[0]["slug"]["current"], "motor-e");
        assert_eq!(old[0]["slug"]["current"], "stary-motor-e");
    }

    #[tokio::test]
    async fn failed_images_do_not_fail_the_record() {
        let store = MemoryStore::default();
        let ingester = StubIngester {
            fail: true,
            ..Default::default()
        };
        let records = vec![record("Motor F", "motor-f", 10_000.0, 3)];

        let summary = migrator(&store, &ingester, OLD_MOTORS).run(&records).await;
        assert_eq!(summary.created, 1);
        let doc = &store.documents_of_type("staryMotor")[0];
        assert_eq!(doc["images"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn store_rejection_fails_only_that_record() {
        let store = MemoryStore {
            fail_create_for_name: Some("Motor G".to_string()),
            ..Default::default()
        };
        let ingester = StubIngester::default();
        let records = vec![
            record("Motor G", "motor-g", 10_000.0, 0),
            record("Motor H", "motor-h", 10_000.0, 0),
        ];

        let summary = migrator(&store, &ingester, OLD_MOTORS).run(&records).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(store.documents_of_type("staryMotor").len(), 1);
    }

    #[tokio::test]
    async fn end_to_end_scenario_bmw_tdi() {
        let store = MemoryStore::default();
        let ingester = StubIngester::default();
        let records = vec![LegacyRecord {
            id: None,
            name: "BMW 2.0 TDI 110kW".to_string(),
            slug: "bmw-2-0-tdi".to_string(),
            mark_name: "BMW".to_string(),
            description: "kód motoru: AKL, nájezdem 180000 km".to_string(),
            price: 45_000.0,
            images: vec![
                "https://legacy.example/1.jpg".to_string(),
                "https://legacy.example/2.jpg".to_string(),
            ],
            created_at: None,
            updated_at: None,
        }];

        migrator(&store, &ingester, OLD_MOTORS).run(&records).await;
        let doc = &store.documents_of_type("staryMotor")[0];
        assert_eq!(doc["fuelType"], "diesel");
        assert!(doc["engineCodes"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c == "AKL"));
        assert_eq!(doc["mileage"], "180000 km");
        assert_eq!(doc["price"], 45_000.0);
        assert_eq!(doc["images"].as_array().unwrap().len(), 2);
        // 45 000 CZK clears the used-engine featured threshold of 20 000.
        assert_eq!(doc["featured"], true);
    }

    #[test]
    fn legacy_record_parses_mongo_export_shape() {
        let raw = r#"[{
            "_id": {"$oid": "651f00000000000000000001"},
            "markName": "Škoda",
            "slug": "skoda-octavia-19-tdi",
            "name": "Škoda Octavia 1.9 TDI",
            "description": "kód motoru: AXR",
            "price": 28000,
            "createdAt": {"$date": "2023-10-05T12:00:00.000Z"},
            "updatedAt": {"$date": "2023-10-06T12:00:00.000Z"},
            "images": ["https://legacy.example/a.jpg"]
        }]"#;
        let records: Vec<LegacyRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id.as_ref().unwrap().oid, "651f00000000000000000001");
        assert_eq!(r.mark_name, "Škoda");
        assert_eq!(r.price, 28000.0);
        assert!(r.created_at.is_some());
    }
}
