//! httpserve demo server.
//!
//! # Routes
//!
//! ```text
//!     GET  /            basic-auth echo page (any credentials), session hit counter
//!     *    /wsdltest    SOAP `person` interface: WSDL on GET, calls on POST
//!     POST /upload      lists the parts of a multipart/form-data submission
//!     WS   /chat        broadcast chat room for clients holding a session cookie
//! ```
//!
//! Run with `httpserve --config server.toml`; without a file every setting
//! keeps its default and the server listens on `0.0.0.0:8080`.

use std::path::PathBuf;

use clap::Parser;
use serde_json::{json, Value};

use httpserve::config::{load_config, ServerConfig};
use httpserve::http::{HttpError, HttpHandler, HttpServer, HttpServerRequest, HttpServerResponse};
use httpserve::lifecycle::{signals, Shutdown};
use httpserve::observability;
use httpserve::soap::{DataType, MaxOccurs, SchemaNode, SoapEndpoint, SoapError, SoapFault, SoapService, WsInterface};
use httpserve::websocket::{Connection, ConnectionId, ConnectionRegistry, WebsocketHandler};

#[derive(Parser)]
#[command(name = "httpserve")]
#[command(about = "Demo HTTP, websocket and SOAP server", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    observability::logging::init(&config.observability)?;

    tracing::info!("httpserve v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        tls = config.listener.tls.is_some(),
        max_threads = config.threads.max,
        request_timeout_secs = config.limits.request_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let demo = DemoServer::new(&config)?;
    let mut server = HttpServer::with_config(config, demo);
    server.set_ws();

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());
    server.start(shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

struct DemoServer {
    soap: SoapEndpoint<PersonService>,
    chat: ConnectionRegistry,
    session_cookie: String,
}

impl DemoServer {
    fn new(config: &ServerConfig) -> Result<Self, SoapError> {
        let host = match config.listener.host.as_str() {
            "0.0.0.0" | "::" => "localhost",
            host => host,
        };
        let scheme = if config.listener.tls.is_some() { "https" } else { "http" };
        let location = format!("{scheme}://{host}:{}/wsdltest", config.listener.port);

        Ok(Self {
            soap: SoapEndpoint::new(person_interface(&location)?, PersonService),
            chat: ConnectionRegistry::new(),
            session_cookie: config.session.cookie_name.clone(),
        })
    }
}

impl HttpHandler for DemoServer {
    async fn handle(&self, req: &mut HttpServerRequest, res: &mut HttpServerResponse) -> Result<(), HttpError> {
        let target = req.request().to_string();
        match target.as_str() {
            "/wsdltest" => self.soap.handle(req, res).await,
            "/upload" => list_parts(req, res),
            _ => echo(req, res).await,
        }
    }

    fn on_handle(&self, target: &str) -> Option<Box<dyn WebsocketHandler>> {
        if target != "/chat" {
            return None;
        }
        Some(Box::new(ChatMember {
            room: self.chat.clone(),
            session_cookie: self.session_cookie.clone(),
            id: None,
        }))
    }
}

/// Challenge for credentials, then dump what the server saw.
async fn echo(req: &mut HttpServerRequest, res: &mut HttpServerResponse) -> Result<(), HttpError> {
    let Some(creds) = req.get_basic_auth() else {
        res.set_basic_auth("Test Server")?;
        return Ok(());
    };

    let session = req.get_session(true)?;
    let hits = session.attribute("hits")?.and_then(|v| v.as_i64()).unwrap_or(0) + 1;
    session.set_attribute("hits", hits)?;

    let info = json!({
        "method": req.method().as_str(),
        "request": req.request(),
        "requestUri": req.request_uri(),
        "protocol": req.protocol(),
        "scheme": req.scheme(),
        "remoteHost": req.remote_host(),
        "remotePort": req.remote_port(),
        "locales": req.locales(),
        "headers": req.headers(),
        "queryParams": req.query_params(),
        "cookies": req.cookies(),
        "session": session.id(),
    });
    let info = serde_json::to_string_pretty(&info).map_err(|e| HttpError::Upstream(e.to_string()))?;
    let content = req.get_content().await?;

    res.set_header("content-type", "text/plain; charset=utf-8")?;
    res.println(format!("un: {} pw: {}", creds.user_name, creds.password))?;
    res.println(format!("hits: {hits}"))?;
    res.println("Request Info:")?;
    res.println(info)?;
    res.println("Content:")?;
    res.println(content)?;
    Ok(())
}

fn list_parts(req: &HttpServerRequest, res: &mut HttpServerResponse) -> Result<(), HttpError> {
    res.set_header("content-type", "text/plain; charset=utf-8")?;
    if !req.is_multipart() {
        res.set_status(400)?;
        res.println("expected multipart/form-data")?;
        return Ok(());
    }

    let mut names: Vec<&String> = req.parts().keys().collect();
    names.sort();
    for name in names {
        for part in &req.parts()[name] {
            res.println(format!(
                "{name}: {} bytes, file={}, type={}",
                part.size,
                part.file_name.as_deref().unwrap_or("-"),
                part.content_type
            ))?;
        }
    }
    Ok(())
}

fn person_interface(location: &str) -> Result<WsInterface, SoapError> {
    let person = SchemaNode::new("person", DataType::Object)
        .add(SchemaNode::new("firstName", DataType::String))
        .add(SchemaNode::new("lastName", DataType::String))
        .add(SchemaNode::new("age", DataType::Long))
        .add(SchemaNode::optional("emailAddress", DataType::String));
    let call_response = SchemaNode::new("callResponse", DataType::Object)
        .add(SchemaNode::new("success", DataType::Boolean))
        .add(SchemaNode::new("error", DataType::String));
    let people = SchemaNode::new("people", DataType::Object)
        .min_occurs(1)
        .max_occurs(MaxOccurs::Unbounded)
        .add(person.clone());

    let mut iface = WsInterface::new(location, "person").with_description("Adds people to the directory.");
    iface
        .add_call("addPerson", person, call_response.clone())?
        .add_call("addPeople", people, call_response)?;
    Ok(iface)
}

struct PersonService;

impl SoapService for PersonService {
    async fn invoke(&self, call: &str, request: Value) -> Result<Value, SoapFault> {
        let people: Vec<&Value> = match call {
            "addPerson" => vec![&request["person"]],
            "addPeople" => request["people"]
                .as_array()
                .map(|list| list.iter().map(|entry| &entry["person"]).collect())
                .unwrap_or_default(),
            other => return Err(SoapFault::client(format!("unsupported call {other}"))),
        };

        for person in &people {
            if person["age"].as_i64().is_some_and(|age| age < 0) {
                return Ok(call_response(false, "age must not be negative"));
            }
        }
        for person in people {
            tracing::info!(
                first_name = person["firstName"].as_str().unwrap_or_default(),
                last_name = person["lastName"].as_str().unwrap_or_default(),
                "Person added"
            );
        }
        Ok(call_response(true, ""))
    }
}

fn call_response(success: bool, error: &str) -> Value {
    json!({"callResponse": {"success": success, "error": error}})
}

/// One chat participant. Clients without a session cookie are turned away.
struct ChatMember {
    room: ConnectionRegistry,
    session_cookie: String,
    id: Option<ConnectionId>,
}

impl WebsocketHandler for ChatMember {
    fn on_connect(&mut self, conn: &Connection) {
        if !conn.cookies().iter().any(|c| c.name == self.session_cookie) {
            tracing::info!(connection_id = %conn.id(), "Chat client has no session, closing");
            if let Err(e) = conn.close() {
                tracing::debug!(error = %e, "Close failed");
            }
            return;
        }
        self.room.add(conn);
        self.id = Some(conn.id());
        tracing::info!(connection_id = %conn.id(), members = self.room.len(), "Chat member joined");
    }

    fn on_text(&mut self, conn: &Connection, text: &str) {
        if self.id.is_some() {
            self.room.broadcast(format!("{}: {text}", conn.id()));
        }
    }

    fn on_close(&mut self, _conn: &Connection, status_code: u16, reason: &str) {
        if let Some(id) = self.id.take() {
            self.room.remove(id);
            tracing::info!(connection_id = %id, status_code, reason, "Chat member left");
        }
    }

    fn on_error(&mut self, conn: &Connection, error: &str) {
        tracing::warn!(connection_id = %conn.id(), error, "Chat connection error");
        if let Err(e) = conn.close() {
            tracing::debug!(error = %e, "Close failed");
        }
    }
}
