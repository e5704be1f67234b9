use actix_web::{get, post, web, HttpResponse, Result as WebResult};
use chrono::{Duration, Utc};
use serde_json::json;

use crate::api::error::ApiError;
use crate::api::models::{
    AgentStatusReport, CommandEvent, LimitQuery, ModelUsageEvent, ProcessEvent, Recorded,
    SessionStartEvent, SessionStarted, SummaryQuery, ThinkingEvent, MAX_SUMMARY_HOURS,
};
use crate::balance::BalanceHistory;
use crate::collector::Collector;
use crate::db::{DbPool, DbService};

const DEFAULT_RECENT_LIMIT: usize = 50;
const DEFAULT_THINKING_LIMIT: usize = 20;
const COST_WINDOW_DAYS: i64 = 7;

fn limit_or_reject(query: &LimitQuery, default: usize) -> Result<usize, ApiError> {
    query
        .resolve(default)
        .ok_or_else(|| ApiError::Validation("`limit` must be at least 1".to_string()))
}

// --- Ingestion ---

#[post("/session/start")]
pub async fn start_session(
    collector: web::Data<Collector>,
    req: web::Json<SessionStartEvent>,
) -> WebResult<HttpResponse> {
    let session_id = collector.start_session(req.into_inner())?;
    Ok(HttpResponse::Ok().json(SessionStarted {
        success: true,
        session_id,
    }))
}

#[post("/command")]
pub async fn record_command(
    collector: web::Data<Collector>,
    req: web::Json<CommandEvent>,
) -> WebResult<HttpResponse> {
    let command = collector.record_command(req.into_inner())?;
    Ok(HttpResponse::Ok().json(Recorded {
        success: true,
        id: Some(command.id),
    }))
}

#[post("/llm")]
pub async fn record_llm(
    collector: web::Data<Collector>,
    req: web::Json<ModelUsageEvent>,
) -> WebResult<HttpResponse> {
    let usage = collector.record_model_usage(req.into_inner())?;
    Ok(HttpResponse::Ok().json(Recorded {
        success: true,
        id: Some(usage.id),
    }))
}

#[post("/process")]
pub async fn record_process(
    collector: web::Data<Collector>,
    req: web::Json<ProcessEvent>,
) -> WebResult<HttpResponse> {
    let outcome = collector.record_process(req.into_inner())?;
    Ok(HttpResponse::Ok().json(Recorded {
        success: true,
        id: outcome.id,
    }))
}

#[post("/thinking")]
pub async fn record_thinking(
    collector: web::Data<Collector>,
    req: web::Json<ThinkingEvent>,
) -> WebResult<HttpResponse> {
    let id = collector.record_thinking(req.into_inner())?;
    Ok(HttpResponse::Ok().json(Recorded {
        success: true,
        id: Some(id),
    }))
}

#[get("/thinking")]
pub async fn reasoning_log(
    pool: web::Data<DbPool>,
    query: web::Query<LimitQuery>,
) -> WebResult<HttpResponse> {
    let limit = limit_or_reject(&query, DEFAULT_THINKING_LIMIT)?;
    let conn = DbService::lock(&pool).map_err(ApiError::from)?;
    let events = DbService::reasoning_log(&conn, limit).map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(events))
}

// --- Agent status ---

#[post("/agent/status")]
pub async fn report_status(
    collector: web::Data<Collector>,
    req: web::Json<AgentStatusReport>,
) -> WebResult<HttpResponse> {
    let status = collector.report_status(req.into_inner());
    Ok(HttpResponse::Ok().json(status))
}

#[get("/agent/status")]
pub async fn get_status(collector: web::Data<Collector>) -> WebResult<HttpResponse> {
    let view = collector.status().snapshot().view(Utc::now());
    Ok(HttpResponse::Ok().json(view))
}

// --- Dashboard ---

#[get("/dashboard/summary")]
pub async fn dashboard_summary(
    pool: web::Data<DbPool>,
    query: web::Query<SummaryQuery>,
) -> WebResult<HttpResponse> {
    let since = query.window_start(Utc::now()).ok_or_else(|| {
        ApiError::Validation(format!("`hours` must be between 1 and {MAX_SUMMARY_HOURS}"))
    })?;
    let conn = DbService::lock(&pool).map_err(ApiError::from)?;
    let summary = DbService::summary(&conn, since).map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(summary))
}

#[get("/dashboard/recent")]
pub async fn dashboard_recent(
    pool: web::Data<DbPool>,
    query: web::Query<LimitQuery>,
) -> WebResult<HttpResponse> {
    let limit = limit_or_reject(&query, DEFAULT_RECENT_LIMIT)?;
    let conn = DbService::lock(&pool).map_err(ApiError::from)?;
    let activity = DbService::recent_activity(&conn, limit).map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(activity))
}

#[get("/dashboard/costs")]
pub async fn dashboard_costs(pool: web::Data<DbPool>) -> WebResult<HttpResponse> {
    let since = Utc::now() - Duration::days(COST_WINDOW_DAYS);
    let conn = DbService::lock(&pool).map_err(ApiError::from)?;
    let costs = DbService::cost_breakdown(&conn, since).map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(costs))
}

// --- Balance ---

#[get("/balance")]
pub async fn balance_status(history: Option<web::Data<BalanceHistory>>) -> WebResult<HttpResponse> {
    let Some(history) = history else {
        return Err(ApiError::Upstream("balance tracking is not configured".to_string()).into());
    };
    let Some(latest) = history.latest() else {
        return Err(ApiError::Upstream("no balance reading available yet".to_string()).into());
    };

    Ok(HttpResponse::Ok().json(json!({
        "balance": latest.balance,
        "updated_at": latest.timestamp,
        "stats": history.stats(Utc::now()),
    })))
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::Validation(err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::Validation(err.to_string()).into())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(json_config())
            .app_data(query_config())
            .service(start_session)
            .service(record_command)
            .service(record_llm)
            .service(record_process)
            .service(record_thinking)
            .service(reasoning_log)
            .service(report_status)
            .service(get_status)
            .service(dashboard_summary)
            .service(dashboard_recent)
            .service(dashboard_costs)
            .service(balance_status),
    );
}
