//! Content-metadata import.
//!
//! Turns an archived asset and its `contentMetadata` document into
//! attestations:
//!
//! | source                         | attestation                                   |
//! |--------------------------------|-----------------------------------------------|
//! | asset / zip identifiers, names | `asset`, `filename`, `zipname`, `zipcid`      |
//! | zip identifier                 | `assetcid` on the zip (alias back to asset)   |
//! | fresh encryption key           | `enckey` on the asset, in the key store       |
//! | `extras.*`                     | plain attributes                              |
//! | `extras.relatedAssetCid`       | also `childOf` / `parentOf` list appends      |
//! | `private.*`                    | attributes encrypted with the asset key       |
//! | anything else                  | plain attributes                              |
//!
//! The identity records are written first and abort the import on failure.
//! Metadata attributes are then written one by one; a failure is recorded in
//! the [`ImportReport`] and the import moves on.

use crate::crypter::EncryptionKey;
use crate::crypto::VerifyingKey;
use crate::error::AttestError;
use crate::reader::read_attestation;
use crate::store::{KvTarget, Store};
use crate::types::{ContentId, Value};
use crate::writer::Attestor;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Attribute under which a subject's encryption key is stored.
pub const ENCRYPTION_KEY_ATTRIBUTE: &str = "enckey";

const EXTRAS: &str = "extras";
const PRIVATE: &str = "private";
const RELATED_ASSET: &str = "relatedAssetCid";
const CHILD_OF: &str = "childOf";
const PARENT_OF: &str = "parentOf";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Metadata document has no `contentMetadata` object")]
    MissingContentMetadata,

    #[error("`{0}` must be an object")]
    NotAnObject(String),

    #[error("No content CID known for archive CID {0}")]
    UnmappedCid(String),

    #[error(transparent)]
    Attest(#[from] AttestError),
}

/// The already-identified files of one archive.
#[derive(Debug, Clone)]
pub struct AssetFiles {
    /// Identifier of the archived content
    pub asset: ContentId,
    /// Name of the content file inside the archive
    pub filename: String,
    /// Identifier of the archive itself
    pub zip: ContentId,
    /// File name of the archive
    pub zipname: String,
}

/// Outcome of one import.
#[derive(Debug)]
pub struct ImportReport {
    pub subject: ContentId,
    /// Key used for `private` attributes (also stored as `enckey`)
    pub encryption_key: EncryptionKey,
    /// Attributes written, in order
    pub written: Vec<String>,
    /// Attributes that could not be written
    pub failed: Vec<(String, ImportError)>,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl From<&serde_json::Value> for Value {
    /// Floats and integers outside `i64` become text in their decimal form.
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Text(n.to_string()),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect::<BTreeMap<_, _>>(),
            ),
        }
    }
}

/// Imports archives into a data store, keeping encryption keys in a separate
/// key store.
pub struct MetadataImport<'a, D: ?Sized, K: ?Sized> {
    attestor: &'a Attestor,
    data: &'a D,
    keys: &'a K,
    cid_mapping: HashMap<String, String>,
}

impl<'a, D, K> MetadataImport<'a, D, K>
where
    D: Store + ?Sized,
    K: KvTarget + ?Sized,
{
    pub fn new(attestor: &'a Attestor, data: &'a D, keys: &'a K) -> Self {
        Self {
            attestor,
            data,
            keys,
            cid_mapping: HashMap::new(),
        }
    }

    /// Mapping from encrypted-archive CIDs to content CIDs, used to resolve
    /// `relatedAssetCid`.
    pub fn with_cid_mapping(mut self, mapping: HashMap<String, String>) -> Self {
        self.cid_mapping = mapping;
        self
    }

    /// Import one archive. `document` is the parsed `*-meta-content.json`.
    pub async fn import(
        &self,
        files: &AssetFiles,
        document: &serde_json::Value,
    ) -> Result<ImportReport, ImportError> {
        let metadata = document
            .get("contentMetadata")
            .and_then(serde_json::Value::as_object)
            .ok_or(ImportError::MissingContentMetadata)?;

        let asset = &files.asset;
        let mut report = ImportReport {
            subject: asset.clone(),
            encryption_key: EncryptionKey::generate(),
            written: Vec::new(),
            failed: Vec::new(),
        };

        // Identity records: the asset CID is attested directly so it gets its
        // own signature and timestamp
        let identity = [
            ("asset", Value::Cid(asset.clone())),
            ("filename", Value::from(files.filename.as_str())),
            ("zipname", Value::from(files.zipname.as_str())),
            ("zipcid", Value::Cid(files.zip.clone())),
        ];
        for (attribute, value) in identity {
            self.attestor.put(self.data, asset, attribute, value, None).await?;
            tracing::info!(%asset, attribute, "recorded");
            report.written.push(attribute.to_string());
        }
        self.attestor
            .put(self.data, &files.zip, "assetcid", Value::Cid(asset.clone()), None)
            .await?;
        report.written.push("assetcid".to_string());

        self.attestor
            .put(
                self.keys,
                asset,
                ENCRYPTION_KEY_ATTRIBUTE,
                report.encryption_key.to_value(),
                None,
            )
            .await?;

        for (key, value) in metadata {
            tracing::info!(%asset, key = key.as_str(), "processing metadata key");
            match key.as_str() {
                EXTRAS => self.import_extras(asset, value, &mut report).await,
                PRIVATE => self.import_private(asset, value, &mut report).await,
                _ => {
                    let result = self.attestor.put(self.data, asset, key, Value::from(value), None).await;
                    record(&mut report, key, result.map(drop).map_err(ImportError::from));
                }
            }
        }

        Ok(report)
    }

    async fn import_extras(&self, asset: &ContentId, extras: &serde_json::Value, report: &mut ImportReport) {
        let Some(extras) = extras.as_object() else {
            report
                .failed
                .push((EXTRAS.to_string(), ImportError::NotAnObject(EXTRAS.to_string())));
            return;
        };

        for (key, value) in extras {
            if key == RELATED_ASSET {
                self.link_parent(asset, value, report).await;
            }
            let result = self.attestor.put(self.data, asset, key, Value::from(value), None).await;
            record(report, key, result.map(drop).map_err(ImportError::from));
        }
    }

    async fn import_private(&self, asset: &ContentId, private: &serde_json::Value, report: &mut ImportReport) {
        let Some(private) = private.as_object() else {
            report
                .failed
                .push((PRIVATE.to_string(), ImportError::NotAnObject(PRIVATE.to_string())));
            return;
        };

        for (key, value) in private {
            let result = self
                .attestor
                .put(self.data, asset, key, Value::from(value), Some(&report.encryption_key))
                .await;
            record(report, key, result.map(drop).map_err(ImportError::from));
        }
    }

    /// Record the parent/child relation in both directions. Each direction is
    /// its own append and is reported on its own.
    async fn link_parent(&self, asset: &ContentId, related: &serde_json::Value, report: &mut ImportReport) {
        let parent = match self.resolve_parent(related) {
            Ok(parent) => parent,
            Err(err) => {
                record(report, CHILD_OF, Err(err));
                return;
            }
        };

        let result = self
            .attestor
            .append(self.data, asset, CHILD_OF, Value::Cid(parent.clone()), None)
            .await;
        record(report, CHILD_OF, result.map(drop).map_err(ImportError::from));

        let result = self
            .attestor
            .append(self.data, &parent, PARENT_OF, Value::Cid(asset.clone()), None)
            .await;
        record(report, PARENT_OF, result.map(drop).map_err(ImportError::from));
    }

    /// Map an archive CID from `relatedAssetCid` to its content CID.
    fn resolve_parent(&self, related: &serde_json::Value) -> Result<ContentId, ImportError> {
        let archive_cid = related
            .as_str()
            .ok_or_else(|| ImportError::UnmappedCid(related.to_string()))?;
        let parent = self
            .cid_mapping
            .get(archive_cid)
            .ok_or_else(|| ImportError::UnmappedCid(archive_cid.to_string()))?;
        Ok(ContentId::parse(parent).map_err(AttestError::from)?)
    }
}

fn record(report: &mut ImportReport, attribute: &str, result: Result<(), ImportError>) {
    match result {
        Ok(()) => report.written.push(attribute.to_string()),
        Err(err) => {
            tracing::warn!(attribute, error = %err, "attribute import failed");
            report.failed.push((attribute.to_string(), err));
        }
    }
}

/// Read back the encryption key stored for `subject`.
pub async fn load_encryption_key<K: KvTarget + ?Sized>(
    keys: &K,
    subject: &ContentId,
    signer: &VerifyingKey,
) -> Result<Option<EncryptionKey>, AttestError> {
    let Some(attestation) =
        read_attestation(keys, subject, ENCRYPTION_KEY_ATTRIBUTE, signer, None).await?
    else {
        return Ok(None);
    };
    Ok(Some(EncryptionKey::try_from(&attestation.value)?))
}
