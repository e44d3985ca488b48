use anyhow::Context;
use presto_client::{drain_into, ConnectionParameters, JsonLinesSink, Query, Transport};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let params = ConnectionParameters::from_env().context("reading PRESTO_* configuration")?;
    let sql = std::env::var("PRESTO_QUERY").ok();
    let next_uri = std::env::var("PRESTO_NEXT_URI").ok();
    let output_dir = std::env::var("PRESTO_OUTPUT_DIR").unwrap_or_else(|_| ".".to_string());
    info!(
        target: "presto",
        "presto-query starting: coordinator={}, user='{}', catalog={:?}, schema={:?}, output_dir='{}'",
        params.base_url(), params.user, params.catalog, params.schema, output_dir
    );

    let transport = Transport::new(params).context("building transport")?;
    let mut query = match (next_uri, sql) {
        (Some(uri), _) => Query::resume(&transport, uri),
        (None, Some(sql)) => Query::new(&transport, sql),
        (None, None) => anyhow::bail!("set PRESTO_QUERY or PRESTO_NEXT_URI"),
    };
    query.execute().await.context("submitting query")?;
    let query_id = query.query_id().context("coordinator returned no query id")?.to_string();
    info!(target: "presto", "query {} accepted", query_id);

    let mut sink = JsonLinesSink::create(&output_dir, &query_id).await.context("opening result file")?;
    if let Some(cols) = sink.columns() {
        // A resumed query only learns its columns from the earlier run's file.
        query.adopt_columns(cols.to_vec());
    }
    let mut rows = query.rows();
    let written = drain_into(&mut rows, &mut sink).await.with_context(|| format!("reading results of {query_id}"))?;
    info!(target: "presto", "query {} finished: {} rows written to {}", query_id, written, sink.path().display());

    drop(rows);
    transport.close();
    Ok(())
}
