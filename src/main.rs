use clap::{Args as ClapArgs, Parser, Subcommand};
use robert_a11y::driver::AccessibilityDriver;
use robert_a11y::{
    AccessibilityTree, AppiumClient, AppiumDriver, AppiumOptions, ChromeDriver, ConnectionMode,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use warp::Filter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Dump and query accessibility trees", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tree of a Chrome page
    Chrome {
        #[command(flatten)]
        chrome: ChromeArgs,
        /// Page to open first
        #[arg(long)]
        url: Option<String>,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Print the tree of an existing Appium session
    Appium {
        /// Appium server, e.g. http://127.0.0.1:4723
        #[arg(long)]
        server: String,
        #[arg(long)]
        session: String,
        /// android or ios
        #[arg(long, default_value = "android")]
        platform: String,
        /// Do not switch to NATIVE_APP before reading the tree
        #[arg(long)]
        no_autoswitch: bool,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Serve the tree of a Chrome page over HTTP
    Serve {
        #[command(flatten)]
        chrome: ChromeArgs,
        /// Port to listen on
        #[arg(short, long, default_value_t = 9669)]
        port: u16,
    },
}

#[derive(ClapArgs, Debug)]
struct ChromeArgs {
    /// Attach to a Chrome started with --remote-debugging-port
    #[arg(long)]
    debug_port: Option<u16>,
    #[arg(long)]
    chrome_path: Option<String>,
    #[arg(long)]
    no_sandbox: bool,
    /// Show the browser window
    #[arg(long)]
    headed: bool,
}

impl ChromeArgs {
    fn mode(&self) -> ConnectionMode {
        match self.debug_port {
            Some(port) => ConnectionMode::DebugPort(port),
            None => ConnectionMode::Sandboxed {
                chrome_path: self.chrome_path.clone(),
                no_sandbox: self.no_sandbox,
                headless: !self.headed,
            },
        }
    }
}

#[derive(ClapArgs, Debug)]
struct QueryArgs {
    /// Print only the subtree rooted at this raw_id
    #[arg(long)]
    area: Option<u32>,
    /// Print the element with this raw_id instead of the tree
    #[arg(long)]
    element: Option<u32>,
}

#[derive(Debug, serde::Deserialize)]
struct TreeQuery {
    area: Option<u32>,
}

#[derive(Debug, serde::Deserialize)]
struct NavigateRequest {
    url: String,
}

#[derive(Debug, serde::Deserialize)]
struct ClickRequest {
    id: u32,
}

#[derive(Debug, serde::Serialize)]
struct Response {
    status: String,
    message: String,
    tree: Option<String>,
}

impl Response {
    fn ok(message: impl Into<String>, tree: Option<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            tree,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            tree: None,
        }
    }
}

// Shared state
struct AppState {
    driver: Mutex<ChromeDriver>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Chrome { chrome, url, query } => {
            let driver = ChromeDriver::new(chrome.mode()).await?;
            if let Some(url) = url {
                driver.navigate(&url).await?;
            }
            let tree = driver.accessibility_tree().await?;
            print_query(&tree, &query)?;
            driver.close().await?;
        }
        Command::Appium {
            server,
            session,
            platform,
            no_autoswitch,
            query,
        } => {
            let platform_name = if platform.eq_ignore_ascii_case("ios") {
                "iOS"
            } else {
                "Android"
            };
            let client = AppiumClient::attach(
                &server,
                &session,
                serde_json::json!({ "platformName": platform_name }),
            );
            let options = AppiumOptions {
                autoswitch_contexts: !no_autoswitch,
                ..Default::default()
            };
            let driver = AppiumDriver::new(client, options);
            let tree = driver.accessibility_tree().await?;
            print_query(&tree, &query)?;
        }
        Command::Serve { chrome, port } => serve(chrome, port).await?,
    }

    Ok(())
}

fn print_query(tree: &AccessibilityTree, query: &QueryArgs) -> anyhow::Result<()> {
    if let Some(raw_id) = query.element {
        let element = tree.element_by_id(raw_id)?;
        println!("{}", serde_json::to_string_pretty(&element)?);
        return Ok(());
    }

    match query.area {
        Some(raw_id) => print!("{}", tree.scope_to_area(raw_id).to_str()),
        None => print!("{}", tree.to_str()),
    }
    Ok(())
}

async fn serve(chrome: ChromeArgs, port: u16) -> anyhow::Result<()> {
    let driver = ChromeDriver::new(chrome.mode()).await?;
    log::info!("Starting tree server on port {}", port);

    let state = Arc::new(AppState {
        driver: Mutex::new(driver),
    });
    let state_filter = warp::any().map(move || state.clone());

    // Health check endpoint
    let health =
        warp::path("health").map(|| warp::reply::json(&serde_json::json!({ "status": "ok" })));

    let tree = warp::path("tree")
        .and(warp::get())
        .and(warp::query::<TreeQuery>())
        .and(state_filter.clone())
        .and_then(handle_tree);

    let navigate = warp::path("navigate")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(handle_navigate);

    let click = warp::path("click")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter)
        .and_then(handle_click);

    let routes = health.or(tree).or(navigate).or(click);

    // Bind manually to handle "port in use" error gracefully
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        log::error!("Failed to bind to port {}: {}", port, e);
        anyhow::anyhow!("Port {} is already in use or unavailable", port)
    })?;

    log::info!("Listening on http://{}", addr);
    warp::serve(routes)
        .run_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
        .await;
    Ok(())
}

async fn handle_tree(
    query: TreeQuery,
    state: Arc<AppState>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let driver = state.driver.lock().await;
    let response = match driver.accessibility_tree().await {
        Ok(tree) => {
            let text = match query.area {
                Some(raw_id) => tree.scope_to_area(raw_id).to_str().to_string(),
                None => tree.to_str().to_string(),
            };
            Response::ok("Tree built", Some(text))
        }
        Err(e) => {
            log::error!("Failed to build tree: {}", e);
            Response::error(format!("Failed to build tree: {}", e))
        }
    };
    Ok(warp::reply::json(&response))
}

async fn handle_navigate(
    req: NavigateRequest,
    state: Arc<AppState>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let driver = state.driver.lock().await;
    let response = match driver.navigate(&req.url).await {
        Ok(()) => Response::ok(format!("Navigated to {}", req.url), None),
        Err(e) => Response::error(format!("Navigation failed: {}", e)),
    };
    Ok(warp::reply::json(&response))
}

async fn handle_click(
    req: ClickRequest,
    state: Arc<AppState>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let driver = state.driver.lock().await;
    let response = match driver.click(req.id).await {
        Ok(()) => Response::ok(format!("Clicked raw_id={}", req.id), None),
        Err(e) => Response::error(format!("Click failed: {}", e)),
    };
    Ok(warp::reply::json(&response))
}
