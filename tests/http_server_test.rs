//! End-to-end HTTP tests against a live server.

use httpserve::http::{Cookie, HttpError, HttpHandler, HttpServerRequest, HttpServerResponse};
use httpserve::soap::{DataType, SchemaNode, SoapEndpoint, SoapFault, SoapService, WsInterface};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE, WWW_AUTHENTICATE};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

struct Site;

impl HttpHandler for Site {
    async fn handle(&self, req: &mut HttpServerRequest, res: &mut HttpServerResponse) -> Result<(), HttpError> {
        let target = req.request().to_string();
        match target.as_str() {
            "/params" => {
                let body = serde_json::to_string(req.query_params()).map_err(|e| HttpError::Upstream(e.to_string()))?;
                res.set_header("content-type", "application/json")?;
                res.print(body)?;
            }
            "/auth" => match req.get_basic_auth() {
                Some(creds) => {
                    res.print(format!("{}:{}", creds.user_name, creds.password))?;
                }
                None => {
                    res.set_basic_auth("Test Realm")?;
                }
            },
            "/cookies" => {
                let names: Vec<String> = req.cookies().iter().map(|c| format!("{}={}", c.name, c.value)).collect();
                res.set_cookie(Cookie {
                    path: "/".into(),
                    max_age: 60,
                    ..Cookie::new("flavor", "oatmeal")
                })?;
                res.print(names.join(","))?;
            }
            "/session" => {
                let session = req.get_session(true)?;
                let hits = session.attribute("hits")?.and_then(|v| v.as_i64()).unwrap_or(0) + 1;
                session.set_attribute("hits", hits)?;
                res.print(format!("{} {hits}", session.is_new()))?;
            }
            "/session/peek" => match req.get_session(false) {
                Ok(session) => {
                    res.print(session.id())?;
                }
                Err(HttpError::SessionNull) => {
                    res.print("none")?;
                }
                Err(e) => return Err(e),
            },
            "/upload" => {
                if req.is_multipart() {
                    let mut names: Vec<String> = req
                        .parts()
                        .iter()
                        .flat_map(|(name, parts)| parts.iter().map(move |p| format!("{name}:{}:{}", p.size, p.text())))
                        .collect();
                    names.sort();
                    res.print(names.join("|"))?;
                } else {
                    let content = req.get_content().await?;
                    res.print(format!("plain:{content}"))?;
                }
            }
            "/twice" => {
                req.get_content().await?;
                // Second read must fail.
                match req.get_content().await {
                    Err(HttpError::StreamConsumed) => {
                        res.print("consumed")?;
                    }
                    other => {
                        res.print(format!("unexpected: {other:?}"))?;
                    }
                }
            }
            "/locales" => {
                res.print(req.locales().join(","))?;
            }
            "/redirect" => {
                res.redirect("/target")?;
            }
            "/headers" => {
                res.set_status(201)?
                    .set_int_header("x-count", 7)?
                    .set_date_header("last-modified", 0)?;
            }
            "/fail" => return Err(HttpError::Upstream("boom".into())),
            _ => {
                res.print(format!("{} {}", req.method(), req.request()))?;
            }
        }
        Ok(())
    }
}

async fn site() -> common::TestServer {
    common::spawn_server(common::test_config(false), Site).await
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().redirect(Policy::none()).build().unwrap()
}

#[tokio::test]
async fn repeated_query_params_become_lists() {
    let server = site().await;
    let body: Value = client()
        .get(server.url("/params?a=1&b=2&b=3&c=x%20y"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"a": "1", "b": ["2", "3"], "c": "x y"}));
}

#[tokio::test]
async fn form_posts_arrive_as_query_params() {
    let server = site().await;
    let body: Value = client()
        .post(server.url("/params?a=1"))
        .form(&[("a", "2"), ("name", "Ann Doe")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"a": ["1", "2"], "name": "Ann Doe"}));
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let mut config = common::test_config(false);
    config.limits.max_body_bytes = 16;
    let server = common::spawn_server(config, Site).await;

    let res = client().post(server.url("/upload")).body("x".repeat(64)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let res = client().post(server.url("/upload")).body("small").send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "plain:small");
}

#[tokio::test]
async fn basic_auth_challenge_and_credentials() {
    let server = site().await;
    let client = client();

    let res = client.get(server.url("/auth")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()[WWW_AUTHENTICATE], "Basic realm=\"Test Realm\"");
    assert!(res.text().await.unwrap().is_empty());

    let res = client
        .get(server.url("/auth"))
        .header(AUTHORIZATION, common::basic_auth("alice", "s3cret"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "alice:s3cret");

    // A password containing ':' does not split into exactly two parts.
    let res = client
        .get(server.url("/auth"))
        .header(AUTHORIZATION, common::basic_auth("alice", "a:b"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn request_cookies_are_parsed_and_response_cookies_set() {
    let server = site().await;
    let res = client()
        .get(server.url("/cookies"))
        .header(COOKIE, "a=1; b=two")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()[SET_COOKIE], "flavor=oatmeal; Path=/; Max-Age=60");
    assert_eq!(res.text().await.unwrap(), "a=1,b=two");
}

#[tokio::test]
async fn session_cookie_is_issued_once_and_reused() {
    let server = site().await;
    let client = client();

    let res = client.get(server.url("/session/peek")).send().await.unwrap();
    assert!(res.headers().get(SET_COOKIE).is_none());
    assert_eq!(res.text().await.unwrap(), "none");

    let res = client.get(server.url("/session")).send().await.unwrap();
    let set_cookie = res.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.starts_with("SESSIONID="));
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains("HttpOnly"));
    assert_eq!(res.text().await.unwrap(), "true 1");

    let pair = set_cookie.split(';').next().unwrap().to_string();
    let id = pair.trim_start_matches("SESSIONID=").to_string();

    let res = client.get(server.url("/session")).header(COOKIE, &pair).send().await.unwrap();
    assert!(res.headers().get(SET_COOKIE).is_none());
    assert_eq!(res.text().await.unwrap(), "false 2");

    let res = client.get(server.url("/session/peek")).header(COOKIE, &pair).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), id);

    // Unknown ids start a fresh session.
    let res = client
        .get(server.url("/session"))
        .header(COOKIE, "SESSIONID=stale")
        .send()
        .await
        .unwrap();
    assert!(res.headers().get(SET_COOKIE).is_some());
    assert_eq!(res.text().await.unwrap(), "true 1");
}

#[tokio::test]
async fn multipart_parts_only_for_form_data() {
    let server = site().await;
    let client = client();

    let form = reqwest::multipart::Form::new()
        .text("title", "hello")
        .text("tag", "a")
        .text("tag", "bc")
        .part(
            "file",
            reqwest::multipart::Part::bytes(b"0123456789".to_vec())
                .file_name("digits.txt")
                .mime_str("text/plain")
                .unwrap(),
        );
    let res = client.post(server.url("/upload")).multipart(form).send().await.unwrap();
    assert_eq!(
        res.text().await.unwrap(),
        "file:10:0123456789|tag:1:a|tag:2:bc|title:5:hello"
    );

    let res = client
        .post(server.url("/upload"))
        .header(CONTENT_TYPE, "text/plain")
        .body("raw body")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "plain:raw body");
}

#[tokio::test]
async fn body_can_be_read_once() {
    let server = site().await;
    let res = client().post(server.url("/twice")).body("x").send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "consumed");
}

#[tokio::test]
async fn locales_follow_quality_order() {
    let server = site().await;
    let client = client();

    let res = client
        .get(server.url("/locales"))
        .header("accept-language", "de;q=0.5, fr-CA, en;q=0.8")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "fr-CA,en,de");

    let res = client.get(server.url("/locales")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "en-US");
}

#[tokio::test]
async fn redirect_and_header_helpers() {
    let server = site().await;
    let client = client();

    let res = client.get(server.url("/redirect")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()[LOCATION], "/target");

    let res = client.get(server.url("/headers")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["x-count"], "7");
    assert_eq!(res.headers()["last-modified"], "Thu, 01 Jan 1970 00:00:00 GMT");
}

#[tokio::test]
async fn handler_errors_become_500() {
    let server = site().await;
    let res = client().get(server.url("/fail")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn fallthrough_reports_method_and_path() {
    let server = site().await;
    let res = client().delete(server.url("/things/1?x=y")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "DELETE /things/1");
}

#[tokio::test]
async fn default_handler_serves_placeholder_page() {
    struct Defaults;
    impl HttpHandler for Defaults {}

    let server = common::spawn_server(common::test_config(false), Defaults).await;
    let res = client().get(server.url("/anything")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), httpserve::http::handler::DEFAULT_PAGE);
}

struct Greeter;

impl SoapService for Greeter {
    async fn invoke(&self, _call: &str, request: Value) -> Result<Value, SoapFault> {
        let name = request["greeting"]["name"].as_str().unwrap_or_default().to_string();
        if name.is_empty() {
            return Err(SoapFault::server("no name given"));
        }
        Ok(json!({"reply": {"text": format!("hello {name}"), "length": name.len()}}))
    }
}

fn greeter_interface() -> WsInterface {
    let mut iface = WsInterface::new("urn:greeter", "greeter");
    iface
        .add_call(
            "greet",
            SchemaNode::new("greeting", DataType::Object).add(SchemaNode::new("name", DataType::String)),
            SchemaNode::new("reply", DataType::Object)
                .add(SchemaNode::new("text", DataType::String))
                .add(SchemaNode::new("length", DataType::Long)),
        )
        .unwrap();
    iface
}

#[tokio::test]
async fn soap_endpoint_serves_wsdl_and_calls() {
    let endpoint = SoapEndpoint::new(greeter_interface(), Greeter);
    let server = common::spawn_server(common::test_config(false), endpoint).await;
    let client = client();
    let iface = greeter_interface();

    let res = client.get(server.url("/greeter")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()[CONTENT_TYPE].to_str().unwrap().starts_with("text/xml"));
    let wsdl = res.text().await.unwrap();
    assert!(wsdl.contains("greetBinding"));

    let envelope = iface.create_request("greet", &json!({"greeting": {"name": "bob"}})).unwrap();
    let res = client
        .post(server.url("/greeter"))
        .header("SOAPAction", "urn:greeter")
        .header(CONTENT_TYPE, "text/xml")
        .body(envelope)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let reply = iface.parse_response("greet", &res.text().await.unwrap()).unwrap();
    assert_eq!(reply, json!({"reply": {"text": "hello bob", "length": 3}}));

    let res = client
        .post(server.url("/greeter"))
        .body("<not-soap/>")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.text().await.unwrap().contains("soapenv:Client"));
}
