//! Task Lists MCP Server
//!
//! Personal task store with saved, scheduled lists, served over MCP stdio.

use anyhow::Result;
use clap::Parser;
use rmcp::{
    ErrorData, RoleServer, ServerHandler, ServiceExt,
    model::{
        CallToolRequestParams, CallToolResult, Content, InitializeResult, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities,
    },
    service::RequestContext,
    transport::io::stdio,
};
use serde_json::{Value, json};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use task_lists_mcp::cli::{Cli, Command, RunFormat};
use task_lists_mcp::config::{Config, MAX_LIST_LIMIT};
use task_lists_mcp::db::Database;
use task_lists_mcp::error::ToolError;
use task_lists_mcp::format::format_digest_markdown;
use task_lists_mcp::scheduler::{LogSink, Scheduler};
use task_lists_mcp::tools::ToolHandler;
use tokio::sync::watch;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// MCP server handler.
#[derive(Clone)]
struct TaskListsServer {
    tool_handler: Arc<ToolHandler>,
}

const INSTRUCTIONS: &str = "\
Personal task store with saved lists. Create tasks with create_task, save filters with create_list \
(query_definition is a boolean tree of conditions), and read them with run_list. \
Use find_tasks for one-off filters.";

impl ServerHandler for TaskListsServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: Default::default(),
            server_info: rmcp::model::Implementation {
                name: "task-lists-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            capabilities: ServerCapabilities {
                tools: Some(rmcp::model::ToolsCapability::default()),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.tool_handler.get_tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let tool_name = request.name.clone();
        let start = std::time::Instant::now();

        let args = Value::Object(request.arguments.unwrap_or_default());
        match self.tool_handler.call_tool(&tool_name, args).await {
            Ok(result) => {
                let elapsed = start.elapsed();
                debug!(tool = %tool_name, duration_ms = elapsed.as_millis() as u64, "Tool call succeeded");
                Ok(CallToolResult {
                    content: vec![Content::text(result.to_string())],
                    is_error: None,
                    meta: None,
                    structured_content: None,
                })
            }
            Err(e) => {
                let elapsed = start.elapsed();
                // Database and internal failures are mapped to a ToolError too
                let tool_err = ToolError::from(e);
                warn!(
                    tool = %tool_name,
                    error_code = ?tool_err.code,
                    error_message = %tool_err.message,
                    duration_ms = elapsed.as_millis() as u64,
                    "Tool call failed"
                );
                let error_json = serde_json::to_string(&tool_err)
                    .unwrap_or_else(|_| json!({ "error": tool_err.to_string() }).to_string());
                Ok(CallToolResult {
                    content: vec![Content::text(error_json)],
                    is_error: Some(true),
                    meta: None,
                    structured_content: None,
                })
            }
        }
    }
}

/// Install the global subscriber for `--log`: `0`/`off`, `1`/`stdout`,
/// `2`/`stderr`, or a file appended to without ANSI colors.
fn init_logging(target: &str, verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_max_level(level);
    let subscriber = match target {
        "0" | "off" => return Ok(()),
        "1" | "stdout" => builder.with_writer(BoxMakeWriter::new(std::io::stdout)).finish(),
        "2" | "stderr" => builder.with_writer(BoxMakeWriter::new(std::io::stderr)).finish(),
        path => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_writer(BoxMakeWriter::new(file))
                .with_ansi(false)
                .finish()
        }
    };
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, cli.verbose)?;

    let mut config = Config::load_or_default(cli.config.as_deref().map(Path::new))?;

    // Override paths from CLI arguments
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }

    match cli.command {
        Some(Command::Run {
            list,
            limit,
            format,
        }) => run_list_command(&config, &list, limit, format)?,
        Some(Command::Lists) => lists_command(&config)?,
        Some(Command::Serve) | None => run_server(config).await?,
    }

    Ok(())
}

/// Run the MCP server, with the scheduler alongside when enabled.
async fn run_server(config: Config) -> Result<()> {
    config.ensure_db_dir()?;
    let tz = config.timezone();
    let limit = config.default_limit();

    info!(
        "Starting Task Lists MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Database: {:?}", config.server.db_path);
    info!("Time zone: {}", tz);

    let db = Arc::new(Database::open(&config.server.db_path)?);
    info!("Database initialized successfully");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = Scheduler::new(Arc::clone(&db), Arc::new(LogSink), tz, limit);
        let interval = Duration::from_secs(config.scheduler.interval_seconds.max(1));
        Some(tokio::spawn(scheduler.run(interval, shutdown_rx)))
    } else {
        info!("Scheduler disabled (scheduler.enabled = false)");
        None
    };

    let server = TaskListsServer {
        tool_handler: Arc::new(ToolHandler::new(Arc::clone(&db), tz, limit)),
    };

    // Run the stdio server
    info!("Server ready, listening on stdio");
    let transport = stdio();
    let service = server.serve(transport).await?;
    service.waiting().await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }

    Ok(())
}

/// Run the `run` command
fn run_list_command(
    config: &Config,
    reference: &str,
    limit: Option<usize>,
    format: RunFormat,
) -> Result<()> {
    let db = Database::open(&config.server.db_path)?;
    let list = db
        .get_list(reference)?
        .ok_or_else(|| ToolError::list_not_found(reference))?;
    let limit = limit
        .map(|l| l.clamp(1, MAX_LIST_LIMIT))
        .unwrap_or_else(|| config.default_limit());

    let tasks = db.run_list(&list.id, limit, config.timezone())?;

    match format {
        RunFormat::Markdown => print!("{}", format_digest_markdown(&list, &tasks)),
        RunFormat::Json => println!("{}", serde_json::to_string_pretty(&tasks)?),
    }

    Ok(())
}

/// Run the `lists` command
fn lists_command(config: &Config) -> Result<()> {
    let db = Database::open(&config.server.db_path)?;
    let lists = db.list_lists()?;

    if lists.is_empty() {
        println!("No saved lists.");
        return Ok(());
    }
    for list in &lists {
        match &list.schedule {
            Some(schedule) => println!("{:<8} {}  [{}]", list.short_id, list.name, schedule),
            None => println!("{:<8} {}", list.short_id, list.name),
        }
    }

    Ok(())
}
