//! MCP server for iterating on missions until their criteria pass.

mod types;

pub use types::*;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;

use crate::error::MissionError;
use crate::missions::MissionService;
use crate::models::*;

#[derive(Clone)]
pub struct McpServer {
    service: MissionService,
    tool_router: ToolRouter<Self>,
}

/// Map a domain error onto the MCP error space. Caller mistakes become
/// `invalid_params`; everything else is an internal error.
pub fn mcp_error(err: MissionError) -> McpError {
    if err.is_client_error() {
        McpError::invalid_params(err.to_string(), None)
    } else {
        tracing::error!(error = %err, "Mission operation failed");
        McpError::internal_error(err.to_string(), None)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, McpError> {
    serde_json::to_string_pretty(value).map_err(|e| McpError::internal_error(e.to_string(), None))
}

/// Turn a submission outcome into a tool result.
///
/// Running out of attempts is reported as a tool error carrying the final
/// mission state, so the agent sees it as the end of the mission rather than
/// a protocol failure.
pub fn submission_result(
    result: Result<SubmitOutcome, MissionError>,
) -> Result<CallToolResult, McpError> {
    match result {
        Ok(outcome) => Ok(CallToolResult::success(vec![Content::text(to_json(&outcome)?)])),
        Err(MissionError::MaxAttemptsExceeded {
            mission_id,
            max_attempts,
        }) => {
            let error = MissionError::MaxAttemptsExceeded {
                mission_id: mission_id.clone(),
                max_attempts,
            };
            let body = ExhaustedResponse {
                mission_id,
                error: error.to_string(),
                state: MissionState::Failed.as_str().to_string(),
                is_final: true,
            };
            Ok(CallToolResult::error(vec![Content::text(to_json(&body)?)]))
        }
        Err(err) => Err(mcp_error(err)),
    }
}

impl McpServer {
    pub fn new(service: MissionService) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    // ============================================================
    // Tool logic, exposed for direct use in tests
    // ============================================================

    pub fn handle_define_mission(&self, req: DefineMissionRequest) -> Result<Mission, McpError> {
        self.service
            .define_mission(DefineMissionInput {
                id: req.mission_id,
                goal: req.goal,
                criteria: req.criteria,
                max_attempts: req.max_attempts,
                context: req.context,
                start: None,
            })
            .map_err(mcp_error)
    }

    pub fn handle_submit_attempt(
        &self,
        req: SubmitAttemptRequest,
    ) -> Result<SubmitOutcome, MissionError> {
        self.service.submit_attempt(
            &req.mission_id,
            SubmitAttemptInput {
                output: req.output,
                value: req.value.as_ref().and_then(AttemptValue::from_json),
                duration_ms: req.duration_ms,
            },
        )
    }

    pub fn handle_get_mission_status(
        &self,
        req: GetMissionStatusRequest,
    ) -> Result<MissionStatus, McpError> {
        self.service.get_status(&req.mission_id).map_err(mcp_error)
    }

    pub fn handle_abort_mission(
        &self,
        req: AbortMissionRequest,
    ) -> Result<AbortConfirmation, McpError> {
        self.service
            .abort_mission(&req.mission_id, req.reason)
            .map_err(mcp_error)
    }

    pub fn handle_list_missions(
        &self,
        req: ListMissionsRequest,
    ) -> Result<MissionListResponse, McpError> {
        let state = match req.state.as_deref() {
            Some(s) => Some(MissionState::from_str(s).ok_or_else(|| {
                McpError::invalid_params(
                    format!(
                        "Invalid state '{}'. Use PENDING, IN_PROGRESS, COMPLETED, FAILED or ABORTED.",
                        s
                    ),
                    None,
                )
            })?),
            None => None,
        };

        Ok(MissionListResponse {
            missions: self
                .service
                .list_missions(state)
                .into_iter()
                .map(MissionInfo::from)
                .collect(),
        })
    }
}

#[tool_router]
impl McpServer {
    #[tool(
        description = "Define a mission: a goal plus machine-checkable success criteria and an attempt budget. Call this FIRST, before iterating. Returns the mission with its id and state IN_PROGRESS. Criteria types: NUMERIC (compare a number against a threshold), EXIT_CODE (match a process exit code), KEYWORD (require or forbid a keyword in the output)."
    )]
    async fn define_mission(
        &self,
        params: Parameters<DefineMissionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mission = self.handle_define_mission(params.0)?;
        Ok(CallToolResult::success(vec![Content::text(to_json(&mission)?)]))
    }

    #[tool(
        description = "Submit the result of one attempt at a mission. The attempt is validated against the mission criteria and counted against the budget. Returns passed, final, feedback explaining the gap to the target, and a progress summary. When final is true, stop iterating. Submitting after the budget is spent fails the mission."
    )]
    async fn submit_attempt(
        &self,
        params: Parameters<SubmitAttemptRequest>,
    ) -> Result<CallToolResult, McpError> {
        submission_result(self.handle_submit_attempt(params.0))
    }

    #[tool(
        description = "Get the current status of a mission: state, attempts used and remaining, progress percentage, the last validation result and a summary of every attempt."
    )]
    async fn get_mission_status(
        &self,
        params: Parameters<GetMissionStatusRequest>,
    ) -> Result<CallToolResult, McpError> {
        let status = self.handle_get_mission_status(params.0)?;
        Ok(CallToolResult::success(vec![Content::text(to_json(&status)?)]))
    }

    #[tool(
        description = "Abandon a mission that is IN_PROGRESS. The mission moves to ABORTED and accepts no further attempts. Include a reason so the history explains why."
    )]
    async fn abort_mission(
        &self,
        params: Parameters<AbortMissionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let confirmation = self.handle_abort_mission(params.0)?;
        Ok(CallToolResult::success(vec![Content::text(to_json(
            &confirmation,
        )?)]))
    }

    #[tool(
        description = "List missions ordered by creation time. Optionally filter by state (PENDING, IN_PROGRESS, COMPLETED, FAILED, ABORTED)."
    )]
    async fn list_missions(
        &self,
        params: Parameters<ListMissionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let list = self.handle_list_missions(params.0)?;
        Ok(CallToolResult::success(vec![Content::text(to_json(&list)?)]))
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: "mission-control".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            instructions: Some(
                r#"Mission Control keeps score while you iterate on a task until it measurably succeeds.

WORKFLOW:
1. Call define_mission with a goal and criteria you can check mechanically
2. Do the work, run the command, collect its output
3. Call submit_attempt with the output (and value, when you have the number)
4. Read the feedback. If final is false, adjust and go back to step 2
5. Stop when final is true: the mission is COMPLETED or out of attempts

CRITERIA:
- NUMERIC: {"type": "NUMERIC", "operator": "GREATER_THAN_OR_EQUAL", "threshold": 90, "metric_name": "coverage"}
  Operators: GREATER_THAN, GREATER_THAN_OR_EQUAL, LESS_THAN, LESS_THAN_OR_EQUAL, EQUAL, NOT_EQUAL
  The value is taken from `value`, or the first number in the output.
- EXIT_CODE: {"type": "EXIT_CODE", "expected_code": 0}
  The code is taken from `value`, or from "exit code: N" style text in the output.
- KEYWORD: {"type": "KEYWORD", "keyword": "All tests passed", "must_contain": true, "case_sensitive": false}

GUIDELINES:
- Pick criteria that reflect the real goal, not a proxy that is easy to hit
- Pass `value` explicitly whenever you know it; parsing output is a fallback
- Feedback warns when attempts run low or results stop improving. Change approach when it does.
- Call abort_mission if the goal turns out to be wrong, instead of burning attempts
- get_mission_status shows the whole attempt history"#
                    .into(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(service: MissionService) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let server = McpServer::new(service).serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}
