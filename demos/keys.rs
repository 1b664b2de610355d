use metabase_client::{
    keys::{CreateKeyRequest, KeyFilter, KeyType},
    MetaBaseClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = MetaBaseClient::from_env()?;
    let keys = client.keys();

    let created = keys
        .create(&CreateKeyRequest::new("ci-pipeline", KeyType::Service).with_scopes(["read", "table:read"]))
        .await?
        .into_result()?;
    println!("created {} ({:?})", created.id, created.key_prefix);

    let listed = keys
        .list(Some(&KeyFilter {
            kind: Some(KeyType::Service),
            ..KeyFilter::default()
        }))
        .await?;
    for key in listed.data().into_iter().flatten() {
        println!("{} {:?} scopes={:?}", key.name, key.status, key.scopes);
    }

    keys.revoke(&created.id).await?.into_result()?;
    Ok(())
}
