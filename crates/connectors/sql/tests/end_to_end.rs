use datafusion::arrow::array::{Int64Array, StringArray};
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use datafusion::arrow::record_batch::RecordBatch;
use igloo_common::{Record, Value};
use igloo_connector_sql::split::{count_query, range_query};
use igloo_connector_sql::{
    Connector, DatabaseClient, EmbeddedClient, MemoryClient, PartitionReader, PartitionSpec, PlanningConfig,
    SqlConnector,
};
use std::sync::Arc;

const REGIONS: [&str; 3] = ["amer", "apac", "emea"];

/// `people(id, name, region)` with ids 0..n in shuffled insertion order.
fn people_client(n: i64) -> EmbeddedClient {
    let ids: Vec<i64> = (0..n).rev().collect();
    let names: Vec<String> = ids.iter().map(|i| format!("person{}", i)).collect();
    let regions: Vec<&str> = ids.iter().map(|i| REGIONS[*i as usize % REGIONS.len()]).collect();
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("region", DataType::Utf8, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(names)),
            Arc::new(StringArray::from(regions)),
        ],
    )
    .unwrap();

    let client = EmbeddedClient::new();
    client.register_batch("people", batch).unwrap();
    client
}

async fn read_all(connector: &dyn Connector, split: PartitionSpec) -> Vec<(u64, Record)> {
    let mut reader = connector.read_split(split).await.unwrap();
    let mut rows = Vec::new();
    while let Some((key, record)) = reader.next().await.unwrap() {
        rows.push((key, record.clone()));
    }
    assert_eq!(reader.progress(), 1.0);
    reader.close().await.unwrap();
    rows
}

#[tokio::test]
async fn test_scripted_count_range_job() {
    let base = "select id from events";
    let client = MemoryClient::new();
    client.register(count_query(base), 1, vec![vec![Value::Integer(10)]]).await;
    for (start, end) in [(0, 2), (2, 4), (4, 6), (6, 10)] {
        let rows = (start..end).map(|i| vec![Value::Integer(i as i64)]).collect();
        client.register(range_query(base, start, end - start, None), 1, rows).await;
    }

    let connector = SqlConnector::new(Arc::new(client.clone()), PlanningConfig::new(base));
    let splits = connector.get_splits(4).await.unwrap();
    assert_eq!(splits.len(), 4);

    let mut keys = Vec::new();
    for split in splits {
        for (key, record) in read_all(&connector, split).await {
            assert_eq!(record.get(0), Some(&Value::Integer(key as i64)));
            keys.push(key);
        }
    }
    assert_eq!(keys, (0..10).collect::<Vec<u64>>());
    // One planning connection plus one per split, all released
    assert_eq!(client.connections_opened(), 5);
    assert_eq!(client.connections_closed(), 5);
}

#[tokio::test]
async fn test_embedded_count_range_job() {
    let client = people_client(10);
    let config = PlanningConfig::new("SELECT id, name FROM people;").with_order_by("id");
    let connector = SqlConnector::new(Arc::new(client), config);

    let splits = connector.get_splits(4).await.unwrap();
    let widths: Vec<Option<u64>> = splits.iter().map(PartitionSpec::length).collect();
    assert_eq!(widths, vec![Some(2), Some(2), Some(2), Some(4)]);

    let mut rows = Vec::new();
    for split in splits {
        rows.extend(read_all(&connector, split).await);
    }
    assert_eq!(rows.len(), 10);
    for (key, record) in &rows {
        // Ordering by id makes every key match its row
        assert_eq!(record.values(), &[Value::Integer(*key as i64), Value::Text(format!("person{}", key))]);
    }
}

#[tokio::test]
async fn test_embedded_more_splits_than_rows() {
    let client = people_client(3);
    let config = PlanningConfig::new("SELECT id FROM people").with_order_by("id");
    let connector = SqlConnector::new(Arc::new(client), config);

    let splits = connector.get_splits(5).await.unwrap();
    assert_eq!(splits.len(), 5);
    let mut keys = Vec::new();
    for split in splits {
        keys.extend(read_all(&connector, split).await.into_iter().map(|(k, _)| k));
    }
    assert_eq!(keys, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_embedded_query_derived_job() {
    let client = people_client(9);
    let config = PlanningConfig::new("SELECT id FROM people WHERE region = $1 ORDER BY id")
        .with_params("SELECT DISTINCT region FROM people ORDER BY region");
    let connector = SqlConnector::new(Arc::new(client), config);

    let splits = connector.get_splits(1).await.unwrap();
    let params: Vec<&[Value]> = splits.iter().map(PartitionSpec::bind_params).collect();
    assert_eq!(
        params,
        vec![&[Value::from("amer")][..], &[Value::from("apac")][..], &[Value::from("emea")][..]]
    );

    let mut per_region = Vec::new();
    for split in splits {
        let rows = read_all(&connector, split).await;
        let keys: Vec<u64> = rows.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, (0..rows.len() as u64).collect::<Vec<u64>>());
        per_region.push(rows.into_iter().map(|(_, r)| r.into_values()).collect::<Vec<_>>());
    }
    assert_eq!(
        per_region[1],
        vec![vec![Value::Integer(1)], vec![Value::Integer(4)], vec![Value::Integer(7)]]
    );
}

#[tokio::test]
async fn test_embedded_literal_list_job() {
    let client = people_client(6);
    let config = PlanningConfig::new("SELECT count(*) FROM people WHERE region = $1").with_params("'emea', apac");
    let connector = SqlConnector::new(Arc::new(client), config);

    let splits = connector.get_splits(1).await.unwrap();
    let mut counts = Vec::new();
    for split in splits {
        let rows = read_all(&connector, split).await;
        counts.push(rows[0].1.get(0).cloned());
    }
    assert_eq!(counts, vec![Some(Value::Integer(2)), Some(Value::Integer(2))]);
}

#[tokio::test]
async fn test_splits_read_concurrently_after_shipping() {
    let client: Arc<dyn DatabaseClient> = Arc::new(people_client(20));
    let config = PlanningConfig::new("SELECT id FROM people").with_order_by("id");
    let splits = SqlConnector::new(client.clone(), config).get_splits(3).await.unwrap();

    // Splits travel to workers as bytes
    let shipped: Vec<Vec<u8>> = splits.iter().map(|s| s.to_bytes().unwrap()).collect();

    let mut handles = Vec::new();
    for bytes in shipped {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let split = PartitionSpec::from_bytes(&bytes).unwrap();
            let mut reader = PartitionReader::open(client.as_ref(), split).await.unwrap();
            let mut keys = Vec::new();
            while let Some((key, record)) = reader.next().await.unwrap() {
                assert_eq!(record.get(0), Some(&Value::Integer(key as i64)));
                keys.push(key);
            }
            reader.close().await.unwrap();
            keys
        }));
    }

    let mut keys = Vec::new();
    for handle in handles {
        keys.extend(handle.await.unwrap());
    }
    assert_eq!(keys, (0..20).collect::<Vec<u64>>());
}
