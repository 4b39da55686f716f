//! Behavior-driven tests for the index snapshot fetcher.
//!
//! Every fetch goes through the static transport, so these run offline.

use std::sync::Arc;

use bovespa_core::{
    FetchError, HttpClient, IndexSnapshotFetcher, SnapshotSource, StaticHttpClient, UtcDateTime,
};

fn collected_at() -> UtcDateTime {
    UtcDateTime::parse("2026-10-16T18:30:00Z").expect("valid timestamp")
}

fn fetcher_for(client: &Arc<StaticHttpClient>) -> IndexSnapshotFetcher {
    let transport: Arc<dyn HttpClient> = client.clone();
    IndexSnapshotFetcher::new(transport).with_url("https://example.test/ibov")
}

const PORTFOLIO_PAGE: &str = r#"
<html><body>
<table class="table">
  <thead><tr><th>Código</th><th>Ação</th><th>Tipo</th><th>Qtde. Teórica</th><th>Part. (%)</th></tr></thead>
  <tbody>
    <tr><td>PETR4</td><td>PETROBRAS</td><td>PN  N2</td><td>4.500.000.000</td><td>8,500</td></tr>
    <tr><td>VALE3</td><td>VALE</td><td>ON N1</td><td>5.200.000.000</td><td>9,2</td></tr>
    <tr><td>ABEV3</td><td>AMBEV S/A</td><td>ON</td><td>4.400.000.000</td><td>2,7%</td></tr>
    <tr><td>Quantidade Teórica Total</td><td></td><td></td><td>14.100.000.000</td><td>20,4</td></tr>
    <tr><td>Redutor</td><td></td><td></td><td>1,0</td><td></td></tr>
  </tbody>
</table>
</body></html>
"#;

// =============================================================================
// Successful scrapes
// =============================================================================

#[tokio::test]
async fn portfolio_table_becomes_one_row_per_constituent() {
    // Given: the portfolio page renders a table with two trailing summary rows
    let client = Arc::new(StaticHttpClient::ok(PORTFOLIO_PAGE));

    // When: the fetcher downloads and parses it
    let snapshot = fetcher_for(&client)
        .fetch(collected_at())
        .await
        .expect("fetch succeeds");

    // Then: only real constituents remain, with pt-BR numbers decoded
    assert_eq!(snapshot.source, SnapshotSource::Table);
    let codes: Vec<&str> = snapshot.rows.iter().map(|row| row.code.as_str()).collect();
    assert_eq!(codes, ["PETR4", "VALE3", "ABEV3"]);
    assert_eq!(snapshot.rows[0].theoretical_quantity, 4_500_000_000.0);
    assert_eq!(snapshot.rows[0].weight_percent, 8.5);
    assert_eq!(snapshot.rows[2].weight_percent, 2.7);

    // And: every row carries the collection date as its trade date
    assert!(snapshot
        .rows
        .iter()
        .all(|row| row.trade_date == collected_at().date() && row.collected_at == collected_at()));
}

#[tokio::test]
async fn script_embedded_results_are_used_when_the_table_is_missing() {
    let page = r#"<html><script>
        window.__DATA__ = {"page":{"pageNumber":1},"results":[
            {"segment":null,"cod":"ITUB4","asset":"ITAUUNIBANCO","type":"PN  N1","part":"7,100","theoricalQty":"3.800.000.000"},
            {"segment":null,"cod":"WEGE3","asset":"WEG","type":"ON  NM","part":"4,8","theoricalQty":"2.800.000.000"}
        ]};
    </script></html>"#;
    let client = Arc::new(StaticHttpClient::ok(page));

    let snapshot = fetcher_for(&client)
        .fetch(collected_at())
        .await
        .expect("fetch succeeds");

    assert_eq!(snapshot.source, SnapshotSource::ScriptJson);
    assert_eq!(snapshot.rows.len(), 2);
    assert_eq!(snapshot.rows[1].code, "WEGE3");
    assert_eq!(snapshot.rows[1].theoretical_quantity, 2_800_000_000.0);
}

// =============================================================================
// Degraded pages
// =============================================================================

#[tokio::test]
async fn page_without_table_or_script_data_falls_back_to_placeholder_rows() {
    // Given: a maintenance page with neither a table nor embedded results
    let client = Arc::new(StaticHttpClient::ok(
        "<html><body><h1>Em manutenção</h1></body></html>",
    ));

    // When: it is fetched
    let snapshot = fetcher_for(&client)
        .fetch(collected_at())
        .await
        .expect("fallback is not an error");

    // Then: the snapshot is non-empty and clearly flagged as fallback
    assert!(snapshot.is_fallback());
    assert!(!snapshot.rows.is_empty());
    assert!(snapshot.rows.iter().any(|row| row.code == "PETR4"));
}

#[tokio::test]
async fn rows_with_unparseable_numbers_are_skipped_not_fatal() {
    let page = "<table><tr><th>h</th></tr>\
        <tr><td>PETR4</td><td>PETROBRAS</td><td>PN</td><td>abc</td><td>5,5</td></tr>\
        <tr><td>VALE3</td><td>VALE</td><td>ON</td><td>1.000</td><td>4,2</td></tr></table>";
    let client = Arc::new(StaticHttpClient::ok(page));

    let snapshot = fetcher_for(&client)
        .fetch(collected_at())
        .await
        .expect("fetch succeeds");

    assert_eq!(snapshot.rows.len(), 1);
    assert_eq!(snapshot.rows[0].code, "VALE3");
    assert_eq!(snapshot.skipped.len(), 1);
    assert_eq!(snapshot.skipped[0].code.as_deref(), Some("PETR4"));
}

// =============================================================================
// Transport
// =============================================================================

#[tokio::test]
async fn request_goes_out_once_with_browser_headers() {
    let client = Arc::new(StaticHttpClient::ok(PORTFOLIO_PAGE));

    fetcher_for(&client)
        .with_timeout_ms(1_500)
        .fetch(collected_at())
        .await
        .expect("fetch succeeds");

    let requests = client.requests();
    assert_eq!(requests.len(), 1, "no retries");
    assert_eq!(requests[0].url, "https://example.test/ibov");
    assert_eq!(requests[0].timeout_ms, 1_500);
    assert!(requests[0].header("user-agent").is_some());
    assert_eq!(
        requests[0].header("Accept-Language"),
        Some("pt-BR,pt;q=0.9,en;q=0.8")
    );
}

#[tokio::test]
async fn transport_failure_is_a_network_error() {
    let client = Arc::new(StaticHttpClient::failing("connection reset"));

    let error = fetcher_for(&client)
        .fetch(collected_at())
        .await
        .expect_err("transport failure");

    let FetchError::Network { url, message } = error;
    assert_eq!(url, "https://example.test/ibov");
    assert!(message.contains("connection reset"));
    assert_eq!(client.requests().len(), 1);
}
