use metabase_client::{ApiResponse, Filter, MetaBaseClient, QueryOptions};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("metabase_client=debug")
        .init();

    let client = MetaBaseClient::from_env()?;

    client
        .insert("users", &json!({"name": "Kit", "age": 31}), None)
        .await?
        .into_result()?;

    let options = QueryOptions::new()
        .select(["id", "name"])
        .condition("age", json!({"gte": 18}))
        .order("name.asc")
        .limit(10);

    match client.query("users", Some(&options)).await? {
        ApiResponse::Success(success) => {
            for row in &success.data {
                println!("{row:?}");
            }
            if let Some(count) = success.pagination.count {
                println!("{count} matching rows");
            }
        }
        ApiResponse::Error(err) => eprintln!("query failed: {err}"),
    }

    client
        .delete("users", None, &Filter::new().with("name", "Kit"))
        .await?;

    client.close();
    Ok(())
}
