use aws_lambda_events::event::dynamodb::{Event, EventRecord};
use hazard_shared::{build_service, config::Config, service::HazardService};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use std::sync::Arc;

const REPORT_PREFIX: &str = "HAZARD#";

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env()?;
    let sdk_config = aws_config::load_from_env().await;
    let service = Arc::new(build_service(&config, &sdk_config).await?);

    run(service_fn(move |event: LambdaEvent<Event>| {
        let service = Arc::clone(&service);
        async move { function_handler(event, &service).await }
    }))
    .await
}

async fn function_handler(event: LambdaEvent<Event>, service: &HazardService) -> Result<(), Error> {
    tracing::info!(
        "DynamoDB Stream event received with {} records",
        event.payload.records.len()
    );

    // A failed record is logged and does not fail the batch
    for record in &event.payload.records {
        if let Err(e) = process_record(record, service).await {
            tracing::error!("Failed to process record: {}", e);
        }
    }

    Ok(())
}

async fn process_record(record: &EventRecord, service: &HazardService) -> Result<(), Error> {
    // Only new reports are announced
    if record.event_name != "INSERT" {
        return Ok(());
    }

    let pk = record
        .change
        .new_image
        .get("PK")
        .and_then(|attr| serde_json::to_value(attr).ok())
        .and_then(|v| string_attribute(&v))
        .ok_or("Missing PK")?;

    let Some(report_id) = report_id_from_pk(&pk) else {
        return Ok(());
    };

    let sent = service.announce_new_report(report_id).await?;
    tracing::info!("Report {} announced to {} admins", report_id, sent);
    Ok(())
}

/// Stream images carry either a bare string or the typed `{"S": ...}` form
fn string_attribute(value: &serde_json::Value) -> Option<String> {
    value
        .as_str()
        .or_else(|| value.get("S").and_then(|s| s.as_str()))
        .map(|s| s.to_string())
}

fn report_id_from_pk(pk: &str) -> Option<&str> {
    pk.strip_prefix(REPORT_PREFIX).filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_report_keys_yield_ids() {
        assert_eq!(report_id_from_pk("HAZARD#u1_abc"), Some("u1_abc"));
        assert_eq!(report_id_from_pk("USER#u1"), None);
        assert_eq!(report_id_from_pk("HAZARD#"), None);
    }

    #[test]
    fn both_attribute_shapes_are_read() {
        assert_eq!(
            string_attribute(&serde_json::json!("HAZARD#x")).as_deref(),
            Some("HAZARD#x")
        );
        assert_eq!(
            string_attribute(&serde_json::json!({"S": "HAZARD#y"})).as_deref(),
            Some("HAZARD#y")
        );
        assert_eq!(string_attribute(&serde_json::json!({"N": "3"})), None);
    }
}
