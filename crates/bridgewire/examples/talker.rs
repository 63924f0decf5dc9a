//! Publish a typed message and call a typed service.
//!
//! ```text
//! cargo run -p bridgewire --example talker -- 127.0.0.1:9090
//! ```

use std::sync::Arc;
use std::time::Duration;

use bridgewire::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Chatter {
    data: String,
}

impl BridgeMessage for Chatter {
    const TYPE_NAME: &'static str = "std_msgs/String";
}

#[derive(Debug, Serialize, Deserialize)]
struct AddTwoIntsRequest {
    a: i64,
    b: i64,
}

impl BridgeMessage for AddTwoIntsRequest {
    const TYPE_NAME: &'static str = "rospy_tutorials/AddTwoIntsRequest";
}

#[derive(Debug, Serialize, Deserialize)]
struct AddTwoIntsResponse {
    sum: i64,
}

impl BridgeMessage for AddTwoIntsResponse {
    const TYPE_NAME: &'static str = "rospy_tutorials/AddTwoIntsResponse";
}

const RESPONSE_SCHEMA: &str = r#"{
    "type": "object",
    "required": ["sum"],
    "properties": { "sum": { "type": "integer" } }
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9090".to_string());

    let schemas =
        SchemaRegistry::from_embedded(&[(AddTwoIntsResponse::TYPE_NAME, RESPONSE_SCHEMA)])?;
    let config = SessionConfig::tcp(endpoint)
        .with_encoding(EncodingMode::Binary)
        .with_request_timeout(Some(Duration::from_secs(5)));
    let session = connect_with_schemas(config, Arc::new(schemas)).await?;

    for i in 0..3 {
        let chatter = Chatter {
            data: format!("hello #{i}"),
        };
        session.publish("/chatter", &chatter).await?;
        println!("published {chatter:?}");
    }

    let response: AddTwoIntsResponse = session
        .call_service("/add_two_ints", &AddTwoIntsRequest { a: 20, b: 22 })
        .await?;
    println!("20 + 22 = {}", response.sum);

    session.close().await?;
    Ok(())
}
