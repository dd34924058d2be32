//! Integration tests for the build-and-serve engine.
//!
//! The router is driven in-process with `oneshot`; the compiler is replaced by
//! a fake toolchain that writes a fixed payload to the `-o` path.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};
use tower::ServiceExt;
use wasmserve::response::http_date;
use wasmserve::{
    Invocation, MemorySink, ReloadSignaler, StartupError, ToolOutput, Toolchain, WasmServer,
};
use wasmserve_config::ServeConfig;

const PAYLOAD: &[u8] = b"\0asm\x01\0\0\0";
const LOADER: &str = "// Go wasm loader\n";

struct FakeToolchain {
    goroot: PathBuf,
    fail: AtomicBool,
    builds: AtomicUsize,
}

impl FakeToolchain {
    fn new(goroot: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            goroot,
            fail: AtomicBool::new(false),
            builds: AtomicUsize::new(0),
        })
    }

    fn failing(self: Arc<Self>) -> Arc<Self> {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ToolOutput> {
        match invocation.get_args().first().and_then(|arg| arg.to_str()) {
            Some("env") => Ok(ToolOutput::success(format!(
                "{}\n",
                self.goroot.display()
            ))),
            Some("build") => {
                self.builds.fetch_add(1, Ordering::SeqCst);
                if self.fail.load(Ordering::SeqCst) {
                    return Ok(ToolOutput::failure(
                        Some(1),
                        "# example.com/app\n./main.go:4:2: undefined: x\n",
                    ));
                }
                let out = invocation.flag_value("-o").expect("output flag");
                fs::write(out, PAYLOAD)?;
                Ok(ToolOutput::success(""))
            }
            other => panic!("unexpected toolchain call: {:?}", other),
        }
    }
}

/// Lays out a fake GOROOT and a package directory with one subdirectory.
///
/// Tests run with the crate root as working directory, so `src` and `assets`
/// exist relative to it while `internal` only exists inside the package.
fn layout(temp: &TempDir) -> (ServeConfig, PathBuf) {
    let goroot = temp.path().join("goroot");
    fs::create_dir_all(goroot.join("lib/wasm")).unwrap();
    fs::write(goroot.join("lib/wasm/wasm_exec.js"), LOADER).unwrap();

    let app = temp.path().join("app");
    fs::create_dir_all(app.join("internal")).unwrap();

    let config = ServeConfig {
        wasm_dir: app,
        artifact_name: "app.wasm".into(),
        ..ServeConfig::default()
    };
    (config, goroot)
}

async fn start(
    config: ServeConfig,
    toolchain: Arc<FakeToolchain>,
) -> (WasmServer, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let server = WasmServer::builder(config)
        .toolchain(toolchain)
        .sink(sink.clone())
        .build()
        .await
        .unwrap();
    (server, sink)
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

async fn get_path(router: &Router, uri: &str) -> Response {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn wait_for_waiters(signaler: &ReloadSignaler, count: usize) {
    timeout(Duration::from_secs(2), async {
        while signaler.waiting() != count {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("waiters did not register");
}

#[tokio::test]
async fn test_page_served_at_root_and_index() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let (server, _) = start(config, FakeToolchain::new(goroot)).await;
    let router = server.router();

    for uri in ["/", "/index.html", "/nested/index.html"] {
        let response = get_path(&router, uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        let html = body_text(response).await;
        assert!(html.contains(r#"<script src="wasm_exec.js"></script>"#));
        assert!(html.contains("fetch('app.wasm')"));
        assert!(html.contains("fetch('_wait')"));
    }
}

#[tokio::test]
async fn test_runtime_script_located_and_cached() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let (server, _) = start(config, FakeToolchain::new(goroot)).await;
    let router = server.router();

    let response = get_path(&router, "/wasm_exec.js").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/javascript"
    );
    let last_modified = response.headers()[header::LAST_MODIFIED].clone();
    assert_eq!(last_modified, http_date(server.state().started_at()).as_str());
    assert_eq!(body_text(response).await, LOADER);

    let request = Request::get("/wasm_exec.js")
        .header(header::IF_MODIFIED_SINCE, last_modified)
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(body_text(response).await.is_empty());
}

#[tokio::test]
async fn test_no_content_when_never_built() {
    let temp = TempDir::new().unwrap();
    let (mut config, goroot) = layout(&temp);
    config.auto_rebuild = false;
    let toolchain = FakeToolchain::new(goroot).failing();
    let (server, sink) = start(config, toolchain.clone()).await;

    assert_eq!(toolchain.builds(), 1);
    assert!(server.store().current().is_none());
    assert!(sink.contents().contains("undefined: x"));

    let response = get_path(&server.router(), "/app.wasm").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "no wasm content\n");
    assert_eq!(toolchain.builds(), 1);
}

#[tokio::test]
async fn test_artifact_served_with_build_time() {
    let temp = TempDir::new().unwrap();
    let (mut config, goroot) = layout(&temp);
    config.auto_rebuild = false;
    let toolchain = FakeToolchain::new(goroot);
    let (server, _) = start(config, toolchain.clone()).await;
    let router = server.router();

    let built_at = server.store().current().unwrap().built_at();
    let response = get_path(&router, "/app.wasm").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/wasm");
    assert_eq!(
        response.headers()[header::LAST_MODIFIED],
        http_date(built_at).as_str()
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body.as_ref(), PAYLOAD);

    let request = Request::get("/app.wasm")
        .header(header::IF_MODIFIED_SINCE, http_date(built_at))
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&router, request).await.status(), StatusCode::NOT_MODIFIED);

    // Only the startup build ran.
    assert_eq!(toolchain.builds(), 1);
}

#[tokio::test]
async fn test_auto_rebuild_on_every_artifact_request() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let toolchain = FakeToolchain::new(goroot);
    let (server, _) = start(config, toolchain.clone()).await;
    let router = server.router();

    for expected in 2..=3 {
        let response = get_path(&router, "/app.wasm").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(toolchain.builds(), expected);
    }

    // Other routes never build.
    get_path(&router, "/").await;
    get_path(&router, "/wasm_exec.js").await;
    assert_eq!(toolchain.builds(), 3);
}

#[tokio::test]
async fn test_failed_rebuild_reports_diagnostic_and_keeps_artifact() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let toolchain = FakeToolchain::new(goroot);
    let (server, sink) = start(config, toolchain.clone()).await;
    let router = server.router();
    let before = server.store().current().unwrap();

    toolchain.fail.store(true, Ordering::SeqCst);
    let response = get_path(&router, "/app.wasm").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(body.starts_with("exit status 1\n"));
    assert!(body.contains("./main.go:4:2: undefined: x"));
    assert!(sink.contents().contains("./main.go:4:2: undefined: x"));
    assert_eq!(server.store().current().unwrap(), before);

    toolchain.fail.store(false, Ordering::SeqCst);
    let response = get_path(&router, "/app.wasm").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_prebuilt_artifact_is_never_rebuilt() {
    let temp = TempDir::new().unwrap();
    let (mut config, goroot) = layout(&temp);
    let prebuilt = temp.path().join("prebuilt.wasm");
    fs::write(&prebuilt, b"\0asm-prebuilt").unwrap();
    config.prebuilt = Some(prebuilt);
    let toolchain = FakeToolchain::new(goroot);
    let (server, _) = start(config, toolchain.clone()).await;

    let response = get_path(&server.router(), "/app.wasm").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "\0asm-prebuilt");
    assert_eq!(toolchain.builds(), 0);
    assert!(server.state().pipeline().is_none());
}

#[tokio::test]
async fn test_wait_released_by_notify() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let (server, _) = start(config, FakeToolchain::new(goroot)).await;
    let router = server.router();
    let signaler = server.signaler();

    let waiting = tokio::spawn({
        let router = router.clone();
        async move { get_path(&router, "/_wait").await }
    });
    wait_for_waiters(&signaler, 1).await;
    assert!(!waiting.is_finished());

    let response = get_path(&router, "/_notify").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.is_empty());

    let released = timeout(Duration::from_secs(2), waiting)
        .await
        .expect("wait was not released")
        .unwrap();
    assert_eq!(released.status(), StatusCode::OK);
    assert!(body_text(released).await.is_empty());

    // Nobody is waiting now: notify returns at once and leaves nothing behind.
    let response = timeout(Duration::from_secs(1), get_path(&router, "/_notify"))
        .await
        .expect("notify blocked");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(signaler.waiting(), 0);

    let late = tokio::spawn({
        let router = router.clone();
        async move { get_path(&router, "/_wait").await }
    });
    wait_for_waiters(&signaler, 1).await;
    sleep(Duration::from_millis(50)).await;
    assert!(!late.is_finished());
    late.abort();
}

#[tokio::test]
async fn test_notify_releases_one_of_two_waiters() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let (server, _) = start(config, FakeToolchain::new(goroot)).await;
    let router = server.router();
    let signaler = server.signaler();

    let first = tokio::spawn({
        let router = router.clone();
        async move { get_path(&router, "/_wait").await }
    });
    wait_for_waiters(&signaler, 1).await;
    let second = tokio::spawn({
        let router = router.clone();
        async move { get_path(&router, "/_wait").await }
    });
    wait_for_waiters(&signaler, 2).await;

    get_path(&router, "/_notify").await;
    let released = timeout(Duration::from_secs(2), first)
        .await
        .expect("oldest wait was not released")
        .unwrap();
    assert_eq!(released.status(), StatusCode::OK);

    sleep(Duration::from_millis(50)).await;
    assert!(!second.is_finished());
    assert_eq!(signaler.waiting(), 1);
    second.abort();
}

#[tokio::test]
async fn test_cancelled_wait_frees_its_slot() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let (server, _) = start(config, FakeToolchain::new(goroot)).await;
    let router = server.router();
    let signaler = server.signaler();

    let waiting = tokio::spawn({
        let router = router.clone();
        async move { get_path(&router, "/_wait").await }
    });
    wait_for_waiters(&signaler, 1).await;

    waiting.abort();
    assert!(waiting.await.unwrap_err().is_cancelled());
    assert_eq!(signaler.waiting(), 0);
    assert!(!signaler.notify());
}

#[tokio::test]
async fn test_client_disconnect_frees_wait_slot() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let (server, _) = start(config, FakeToolchain::new(goroot)).await;
    let server = Arc::new(server);
    let signaler = server.signaler();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move {
            server
                .serve_on(listener, async {
                    let _ = stopped.await;
                })
                .await
        }
    });

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /_wait HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    wait_for_waiters(&signaler, 1).await;

    drop(stream);
    wait_for_waiters(&signaler, 0).await;
    assert!(!signaler.notify());

    stop.send(()).unwrap();
    timeout(Duration::from_secs(5), serving)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_releases_waiters_without_reload() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let (server, _) = start(config, FakeToolchain::new(goroot)).await;
    let router = server.router();
    let signaler = server.signaler();

    let waiting = tokio::spawn({
        let router = router.clone();
        async move { get_path(&router, "/_wait").await }
    });
    wait_for_waiters(&signaler, 1).await;

    assert_eq!(signaler.shutdown(), 1);
    let response = timeout(Duration::from_secs(2), waiting)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = get_path(&router, "/_wait").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_directory_in_working_dir_redirects() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let (server, _) = start(config, FakeToolchain::new(goroot)).await;
    let router = server.router();

    assert!(std::path::Path::new("src").is_dir());
    let response = get_path(&router, "/src?v=2").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/src/?v=2");

    let response = get_path(&router, "/deep/src").await;
    assert_eq!(response.headers()[header::LOCATION], "/deep/src/");

    let response = get_path(&router, "/src/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The package directory is not a lookup root.
    let response = get_path(&router, "/internal").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_static_dir_directory_redirects_after_decoding() {
    let temp = TempDir::new().unwrap();
    let (mut config, goroot) = layout(&temp);
    let public = temp.path().join("public");
    fs::create_dir_all(public.join("my dir")).unwrap();
    config.static_dir = Some(public);
    let (server, _) = start(config, FakeToolchain::new(goroot)).await;

    let response = get_path(&server.router(), "/my%20dir").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/my%20dir/");
}

#[tokio::test]
async fn test_unknown_path_not_found_and_logged() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let (server, sink) = start(config, FakeToolchain::new(goroot)).await;

    let response = get_path(&server.router(), "/static/favicon.ico").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(body_text(response).await, "\"favicon.ico\" path not found\n");
    assert!(sink
        .contents()
        .ends_with("\"favicon.ico\" path not found\n"));
}

#[tokio::test]
async fn test_fallback_router_handles_other_paths() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let sink = Arc::new(MemorySink::new());
    let fallback = Router::new().route("/api/hello", get(|| async { "hello from api" }));
    let server = WasmServer::builder(config)
        .toolchain(FakeToolchain::new(goroot))
        .sink(sink.clone())
        .fallback(fallback)
        .build()
        .await
        .unwrap();
    let router = server.router();

    let response = get_path(&router, "/api/hello").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "hello from api");

    // Served resources take precedence over the fallback.
    let response = get_path(&router, "/api/app.wasm").await;
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/wasm");

    let response = get_path(&router, "/api/missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!sink.contents().contains("path not found"));
}

#[tokio::test]
async fn test_custom_index_template() {
    let temp = TempDir::new().unwrap();
    let (mut config, goroot) = layout(&temp);
    let template = temp.path().join("index.html");
    fs::write(&template, "<title>{{ artifact }}</title><p>{{ argv }}</p>").unwrap();
    config.index_html = Some(template);
    config.argv = vec!["-v".into()];
    let (server, _) = start(config, FakeToolchain::new(goroot)).await;

    let html = body_text(get_path(&server.router(), "/").await).await;
    assert_eq!(html, r#"<title>app.wasm</title><p>["js","-v"]</p>"#);
}

#[tokio::test]
async fn test_missing_runtime_script_is_fatal() {
    let temp = TempDir::new().unwrap();
    let (config, _) = layout(&temp);
    let empty_root = temp.path().join("empty-goroot");
    fs::create_dir_all(&empty_root).unwrap();

    let err = WasmServer::builder(config)
        .toolchain(FakeToolchain::new(empty_root))
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, StartupError::Toolchain { .. }));
}

#[tokio::test]
async fn test_scratch_dir_removed_on_drop() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let (server, _) = start(config, FakeToolchain::new(goroot)).await;

    let work_dir = server.work_dir().to_path_buf();
    assert!(work_dir.join("app.wasm").is_file());
    drop(server);
    assert!(!work_dir.exists());
}

#[tokio::test]
async fn test_serve_on_shuts_down_with_parked_wait() {
    let temp = TempDir::new().unwrap();
    let (config, goroot) = layout(&temp);
    let (server, _) = start(config, FakeToolchain::new(goroot)).await;
    let server = Arc::new(server);
    let signaler = server.signaler();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move {
            server
                .serve_on(listener, async {
                    let _ = stopped.await;
                })
                .await
        }
    });

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /_wait HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    wait_for_waiters(&signaler, 1).await;

    stop.send(()).unwrap();
    let mut raw = String::new();
    timeout(Duration::from_secs(5), stream.read_to_string(&mut raw))
        .await
        .expect("wait response not sent")
        .unwrap();
    assert!(raw.starts_with("HTTP/1.1 503"), "{}", raw);

    timeout(Duration::from_secs(5), serving)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}
