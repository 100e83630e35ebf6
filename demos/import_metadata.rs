//! Example: Importing an archive's content metadata as attestations
//!
//! Run with: cargo run --example import_metadata
//!
//! Set `ATTEST_SIGKEY_PATH` to a PKCS#8 PEM Ed25519 key to sign with a fixed
//! identity; otherwise a fresh key is generated.

use anyhow::Context;
use attested_core::{
    load_encryption_key, AssetFiles, AttestorConfig, Attestor, ContentId, LocalTimestamper,
    MemoryStore, MetadataImport, Signer, Value,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🔏 Attested KV - Metadata Import Example\n");
    println!("==============================================\n");

    // Step 1: Signing identity
    println!("1️⃣  Loading signing identity...");
    let config = AttestorConfig::from_env().context("reading configuration")?;
    let attestor = if config.signing_key_path.is_some() {
        Attestor::from_config(&config).context("loading signing key")?
    } else {
        let signer = Signer::generate();
        let authority = LocalTimestamper::new(config.authority_name.clone(), signer.clone());
        Attestor::new(Arc::new(authority))
            .with_signer(signer)
            .with_lock_timeout(config.lock_timeout())
    };
    let verifying_key = attestor.verifying_key()?;
    println!("   ✓ Public key: {:x?}...\n", &verifying_key.to_bytes()[..8]);

    // Step 2: The archive, already unpacked and hashed
    println!("2️⃣  Identifying archive contents...");
    let files = AssetFiles {
        asset: ContentId::for_raw_block(b"<archived web capture>"),
        filename: "capture.wacz".to_string(),
        zip: ContentId::for_raw_block(b"<signed archive>"),
        zipname: "capture-2024-05-01.zip".to_string(),
    };
    let parent = ContentId::for_raw_block(b"<earlier capture>");
    println!("   Asset: {}", files.asset);
    println!("   Zip:   {}\n", files.zip);

    let document = json!({
        "contentMetadata": {
            "description": "Front page capture",
            "sourceId": 4721,
            "extras": {
                "relatedAssetCid": "bafyarchiveofparent",
                "crawler": "browsertrix",
            },
            "private": {
                "uploader": "field-team@example.org",
            },
        }
    });

    // Step 3: Import
    println!("3️⃣  Importing metadata...");
    let (data, keys) = (MemoryStore::new(), MemoryStore::new());
    let mapping = HashMap::from([("bafyarchiveofparent".to_string(), parent.to_string())]);
    let report = MetadataImport::new(&attestor, &data, &keys)
        .with_cid_mapping(mapping)
        .import(&files, &document)
        .await?;

    for attribute in &report.written {
        println!("   ✓ {}", attribute);
    }
    for (attribute, err) in &report.failed {
        println!("   ❌ {}: {}", attribute, err);
    }
    println!("   {} records in data store\n", data.len().await);

    // Step 4: Read back and verify
    println!("4️⃣  Verifying attestations...");
    let encryption_key = load_encryption_key(&keys, &files.asset, &verifying_key)
        .await?
        .context("encryption key missing from key store")?;

    let filename = attestor
        .get(&data, &files.asset, "filename", None)
        .await?
        .context("filename not recorded")?;
    println!("   ✓ filename = {:?} (issued {})", filename.value, filename.timestamp.issued_at);

    let uploader = attestor
        .get(&data, &files.asset, "uploader", Some(&encryption_key))
        .await?
        .context("uploader not recorded")?;
    println!("   ✓ uploader = {:?} (encrypted: {})", uploader.value, uploader.encrypted);

    let children = attestor
        .get(&data, &parent, "parentOf", None)
        .await?
        .context("parentOf not recorded")?;
    if let Value::List(items) = &children.value {
        println!("   ✓ parent has {} child(ren)", items.len());
    }
    println!(
        "   ✓ Timestamp proof valid: {}\n",
        LocalTimestamper::verify(&filename.timestamp, &verifying_key)
    );

    println!("==============================================");
    if report.is_complete() {
        println!("✅ Import complete!");
    } else {
        println!("⚠️  Import finished with {} failure(s)", report.failed.len());
    }
    Ok(())
}
