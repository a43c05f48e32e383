//! The quick-start application, driven through the in-memory test client.

use conduit::prelude::*;
use conduit_test::TestClient;
use http::StatusCode;
use serde_json::json;

fn app() -> TestClient {
    let client = TestClient::from_config(ConduitConfig::default()).unwrap();
    let dispatcher = client.dispatcher();
    dispatcher.register_dependency_value("greeting", String::from("hello"));

    let mut router = Router::new();
    router
        .get(
            "/hello/{name}",
            Endpoint::new(|req, res, deps| {
                Box::pin(async move {
                    let greeting = deps.require::<String>("greeting")?;
                    res.text(format!("{greeting} {}", req.param("name").unwrap_or("?")))?;
                    Ok(())
                })
            })
            .with_dependencies(["greeting"]),
        )
        .unwrap();
    router
        .post(
            "/users",
            Endpoint::new(|req, res, _deps| {
                Box::pin(async move {
                    res.set_status(StatusCode::CREATED)?;
                    res.json(req.body())?;
                    Ok(())
                })
            }),
        )
        .unwrap()
        .validate(
            Validation::json_schema(&json!({
                "type": "object",
                "required": ["name"],
                "properties": { "name": { "type": "string" } }
            }))
            .unwrap(),
        );
    dispatcher.load_router(&router).unwrap();
    client
}

#[tokio::test]
async fn test_hello() {
    app()
        .get("/hello/ada")
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_body_eq("hello ada");
}

#[tokio::test]
async fn test_create_user() {
    let client = app();

    client
        .post("/users")
        .json(&json!({ "name": "ada" }))
        .send()
        .await
        .assert_status(StatusCode::CREATED)
        .assert_json_field("name", &json!("ada"));

    client
        .post("/users")
        .json(&json!({ "name": 7 }))
        .send()
        .await
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_json_field("message", &json!("Validation error"))
        .assert_json_field("errors.0.path.0", &json!("name"));
}
