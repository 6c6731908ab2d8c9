use anyhow::{bail, Context, Result};
use chunkvault::catalog::Catalog;
use chunkvault::config::ClusterConfig;
use chunkvault::networking::messages::NodeId;
use chunkvault::storage::node_service::StorageNodeHandle;
use log::{info, warn};
use rand::seq::IndexedRandom;
use std::time::Duration;

const FIRST_ARTIFACT: &str = "dist-artifact-1";
const SECOND_ARTIFACT: &str = "dist-artifact-2";
const STEP_PAUSE: Duration = Duration::from_secs(1);
const DETECTION_MARGIN: Duration = Duration::from_secs(3);

///
/// Spins up a cluster and walks it through upload, read, update, a node crash,
/// recovery via re-replication and delete, checking content after every step.
///
pub async fn run(config: ClusterConfig, print_json: bool) -> Result<()> {
    let catalog = Catalog::new(config.clone());

    info!("Creating {} storage nodes...", config.node_count);
    let mut nodes: Vec<(NodeId, StorageNodeHandle)> = Vec::with_capacity(config.node_count);
    for _ in 0..config.node_count {
        let handle = StorageNodeHandle::spawn_new();
        let node_id = catalog.register_node(handle.to_rpc()).await;
        nodes.push((node_id, handle));
    }
    info!(
        "Successfully configured {} storage nodes: {:?}",
        nodes.len(),
        nodes.iter().map(|(id, _)| id).collect::<Vec<_>>()
    );

    catalog.start().await;
    let outcome = verify(&catalog, &nodes, &config, print_json).await;
    catalog.stop().await;

    if outcome.is_ok() {
        info!("Verification tests complete. All checks passed.");
    }
    outcome
}

async fn verify(
    catalog: &Catalog,
    nodes: &[(NodeId, StorageNodeHandle)],
    config: &ClusterConfig,
    print_json: bool,
) -> Result<()> {
    info!("Starting verification tests...");
    report(catalog, print_json).await?;

    let first = "Distributed artifact content, first version. ".repeat(5);
    if !catalog.upload(FIRST_ARTIFACT, first.as_bytes()).await {
        bail!("Upload of '{}' failed", FIRST_ARTIFACT);
    }
    let second = "Second artifact, shorter.";
    if !catalog.upload(SECOND_ARTIFACT, second.as_bytes()).await {
        bail!("Upload of '{}' failed", SECOND_ARTIFACT);
    }
    report(catalog, print_json).await?;
    tokio::time::sleep(STEP_PAUSE).await;

    expect_content(catalog, FIRST_ARTIFACT, first.as_bytes()).await?;

    let updated = "Distributed artifact content, UPDATED version. ".repeat(4);
    if !catalog.update(FIRST_ARTIFACT, updated.as_bytes()).await {
        bail!("Update of '{}' failed", FIRST_ARTIFACT);
    }
    expect_content(catalog, FIRST_ARTIFACT, updated.as_bytes()).await?;
    tokio::time::sleep(STEP_PAUSE).await;

    match terminate_random_node(catalog, nodes).await {
        Some(failed_node) => {
            let wait = config.heartbeat_interval()
                + config.replication_check_interval()
                + DETECTION_MARGIN;
            info!("Waiting {:?} for failure detection and re-replication...", wait);
            tokio::time::sleep(wait).await;
            report(catalog, print_json).await?;

            info!("Attempting get after node {} failure...", failed_node);
            expect_content(catalog, FIRST_ARTIFACT, updated.as_bytes()).await?;
        }
        None => warn!("Skipping failure simulation as no storage node is live."),
    }

    if !catalog.delete(SECOND_ARTIFACT).await {
        bail!("Delete of '{}' failed", SECOND_ARTIFACT);
    }
    info!("Attempting to get deleted artifact {}...", SECOND_ARTIFACT);
    if catalog.get(SECOND_ARTIFACT).await.is_some() {
        bail!("Deleted artifact '{}' was retrieved", SECOND_ARTIFACT);
    }
    info!("Verification PASSED: Deleted artifact is not retrievable.");

    report(catalog, print_json).await
}

async fn expect_content(catalog: &Catalog, name: &str, expected: &[u8]) -> Result<()> {
    match catalog.get(name).await {
        Some(content) if content == expected => {
            info!("Content verification PASSED for {}.", name);
            Ok(())
        }
        Some(_) => bail!("Content verification FAILED for {}", name),
        None => bail!("Artifact '{}' could not be read", name),
    }
}

/// Crashes one live node picked at random. Returns its id.
async fn terminate_random_node(
    catalog: &Catalog,
    nodes: &[(NodeId, StorageNodeHandle)],
) -> Option<NodeId> {
    let live = catalog.live_node_ids().await;
    let candidates: Vec<&(NodeId, StorageNodeHandle)> =
        nodes.iter().filter(|(id, _)| live.contains(id)).collect();
    let (node_id, handle) = *candidates.choose(&mut rand::rng())?;

    warn!("Simulating failure: terminating storage node {}", node_id);
    if let Err(e) = handle.terminate().await {
        warn!("Terminating node {} reported: {}", node_id, e);
    }
    Some(node_id.clone())
}

async fn report(catalog: &Catalog, print_json: bool) -> Result<()> {
    let status = catalog.list_status().await;
    if print_json {
        let json =
            serde_json::to_string_pretty(&status).context("Failed to serialize cluster status")?;
        println!("{}", json);
    } else {
        println!("{}\n", status);
    }
    Ok(())
}
