use crate::application::use_cases::intent_catalog::{entity_description, INTENT_CATALOG};
use crate::application::use_cases::llm_understander::LlmUnderstander;
use crate::application::use_cases::query_service::{AskRequest, QueryService};
use crate::application::use_cases::suggestions::entity_label;
use crate::domain::app_config::ServerConfig;
use crate::domain::error::QueryError;
use crate::domain::query::{EntityBag, EntityType, Intent, Language, QueryParams};
use crate::infrastructure::context_store::SessionKey;
use actix_cors::Cors;
use actix_web::{dev::Server, get, post, web, App, HttpResponse, HttpServer, Responder};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError};

pub struct HttpState {
    pub service: Arc<QueryService>,
    pub llm: Arc<LlmUnderstander>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AskBody {
    #[validate(length(min = 1, max = 4096))]
    pub query: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub use_llm: Option<bool>,
    #[serde(default)]
    pub params: QueryParams,
}

const MAX_QUERY_CHARS: usize = 4096;

/// Each batched query obeys the single-query length bounds.
fn validate_query_lengths(queries: &[String]) -> Result<(), ValidationError> {
    let in_bounds = |q: &String| (1..=MAX_QUERY_CHARS).contains(&q.chars().count());
    if queries.iter().all(in_bounds) {
        Ok(())
    } else {
        Err(ValidationError::new("query_length"))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchBody {
    #[validate(length(min = 1, max = 50), custom(function = "validate_query_lengths"))]
    pub queries: Vec<String>,
    #[serde(default)]
    pub use_llm: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ParseBody {
    #[validate(length(min = 1, max = 4096))]
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub use_llm: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub intent: Intent,
    #[serde(default)]
    pub entities: EntityBag,
    #[serde(default)]
    pub params: QueryParams,
    #[serde(default)]
    pub use_llm: Option<bool>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct IntentView {
    intent: Intent,
    description_zh: &'static str,
    description_en: &'static str,
    required_entities: &'static [EntityType],
    entities: &'static [EntityType],
    examples: &'static [&'static str],
}

#[derive(Serialize)]
struct EntityView {
    entity_type: EntityType,
    description: &'static str,
    label_zh: &'static str,
    label_en: &'static str,
}

#[derive(Serialize)]
struct ExampleGroup {
    intent: Intent,
    description: &'static str,
    examples: &'static [&'static str],
}

fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorBody {
        error: message.into(),
    })
}

fn parse_language(raw: Option<&str>) -> Result<Option<Language>, HttpResponse> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() || s.eq_ignore_ascii_case("auto") => Ok(None),
        Some(s) => Language::from_str(s).map(Some).map_err(bad_request),
    }
}

fn query_error_response(err: &QueryError) -> HttpResponse {
    let body = ErrorBody {
        error: err.to_string(),
    };
    match err {
        QueryError::UnknownIntent | QueryError::IncompleteEntities(_) => {
            HttpResponse::BadRequest().json(body)
        }
        QueryError::SecurityViolation(_) => HttpResponse::UnprocessableEntity().json(body),
        QueryError::LlmUnavailable(_) => HttpResponse::ServiceUnavailable().json(body),
        QueryError::QueryGenerationFailure(_) | QueryError::QueryExecutionFailure(_) => {
            HttpResponse::InternalServerError().json(body)
        }
    }
}

#[post("/smart-query/ask")]
async fn ask(data: web::Data<HttpState>, req: web::Json<AskBody>) -> impl Responder {
    if let Err(e) = req.validate() {
        return bad_request(e.to_string());
    }
    let language = match parse_language(req.language.as_deref()) {
        Ok(language) => language,
        Err(response) => return response,
    };
    let body = req.into_inner();
    let session = match (body.user_id, body.session_id) {
        (Some(user_id), Some(session_id)) => Some(SessionKey::new(user_id, session_id)),
        _ => None,
    };

    let response = data
        .service
        .ask(AskRequest {
            text: body.query,
            language,
            session,
            use_llm: body.use_llm,
            params: body.params,
        })
        .await;
    HttpResponse::Ok().json(response)
}

#[post("/smart-query/batch")]
async fn batch(data: web::Data<HttpState>, req: web::Json<BatchBody>) -> impl Responder {
    if let Err(e) = req.validate() {
        return bad_request(e.to_string());
    }
    let body = req.into_inner();
    info!("Batch of {} queries", body.queries.len());

    match data.service.ask_batch(body.queries, body.use_llm).await {
        Ok(items) => HttpResponse::Ok().json(items),
        Err(e) => {
            warn!("Batch rejected: {}", e);
            bad_request(e.to_string())
        }
    }
}

#[post("/nlu/parse")]
async fn parse(data: web::Data<HttpState>, req: web::Json<ParseBody>) -> impl Responder {
    if let Err(e) = req.validate() {
        return bad_request(e.to_string());
    }
    let language = match parse_language(req.language.as_deref()) {
        Ok(language) => language,
        Err(response) => return response,
    };

    match data.service.parse(&req.text, language, req.use_llm).await {
        Ok(nlu) => HttpResponse::Ok().json(nlu),
        Err(e) => {
            error!("Parse failed: {}", e);
            query_error_response(&e)
        }
    }
}

#[post("/nlu/generate-query")]
async fn generate_query(data: web::Data<HttpState>, req: web::Json<GenerateBody>) -> impl Responder {
    match data
        .service
        .generate_query(req.intent, &req.entities, &req.params, req.use_llm)
        .await
    {
        Ok(query) => HttpResponse::Ok().json(query),
        Err(e) => {
            warn!("Query generation failed for {}: {}", req.intent, e);
            query_error_response(&e)
        }
    }
}

#[get("/nlu/intents")]
async fn intents() -> impl Responder {
    let views: Vec<IntentView> = INTENT_CATALOG
        .iter()
        .map(|info| IntentView {
            intent: info.intent,
            description_zh: info.description_zh,
            description_en: info.description_en,
            required_entities: info.intent.required_entities(),
            entities: info.entities,
            examples: info.examples,
        })
        .collect();
    HttpResponse::Ok().json(views)
}

#[get("/nlu/entities")]
async fn entities() -> impl Responder {
    let views: Vec<EntityView> = EntityType::ALL
        .iter()
        .map(|t| EntityView {
            entity_type: *t,
            description: entity_description(*t),
            label_zh: entity_label(*t, Language::Zh),
            label_en: entity_label(*t, Language::En),
        })
        .collect();
    HttpResponse::Ok().json(views)
}

#[get("/smart-query/examples")]
async fn examples() -> impl Responder {
    let groups: Vec<ExampleGroup> = INTENT_CATALOG
        .iter()
        .map(|info| ExampleGroup {
            intent: info.intent,
            description: info.description_en,
            examples: info.examples,
        })
        .collect();
    HttpResponse::Ok().json(groups)
}

#[get("/llm/status")]
async fn llm_status(data: web::Data<HttpState>) -> impl Responder {
    HttpResponse::Ok().json(data.llm.status().await)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(ask)
            .service(batch)
            .service(parse)
            .service(generate_query)
            .service(intents)
            .service(entities)
            .service(examples)
            .service(llm_status),
    );
}

pub fn start_server(state: HttpState, server: &ServerConfig) -> std::io::Result<Server> {
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((server.host.as_str(), server.port))?
    .run();

    Ok(server)
}
