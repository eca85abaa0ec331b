use actix_web::{delete, get, post, put, web, HttpResponse, Result as WebResult};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::error;

use crate::api::models::{
    ChatEvent, ChatTurnRequest, ConversationDetail, ConversationSummary, CreatedConversation,
    ThemeBody,
};
use crate::app::{AppError, AppState, TurnOutcome};
use crate::store::{StoreError, UploadedFile};

fn error_response(e: &AppError) -> HttpResponse {
    let body = serde_json::json!({ "error": e.user_message() });
    match e {
        AppError::Store(StoreError::NotFound(_)) => HttpResponse::NotFound().json(body),
        AppError::Store(StoreError::Busy(_)) => HttpResponse::Conflict().json(body),
        _ => {
            error!("Request failed: {}", e);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

// --- Conversations ---

#[get("")]
pub async fn list_conversations(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    let store = state.store();
    let summaries: Vec<ConversationSummary> = store
        .conversations()
        .iter()
        .map(|c| ConversationSummary::new(c, store.phase(&c.id)))
        .collect();
    Ok(HttpResponse::Ok().json(summaries))
}

#[post("")]
pub async fn create_conversation(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    match state.create_conversation() {
        Ok(id) => Ok(HttpResponse::Created().json(CreatedConversation { id })),
        Err(e) => Ok(error_response(&e)),
    }
}

#[delete("")]
pub async fn clear_conversations(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    match state.clear_all() {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => Ok(error_response(&e)),
    }
}

#[get("/{id}")]
pub async fn get_conversation(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> WebResult<HttpResponse> {
    let store = state.store();
    let detail = store.conversation(&id).map(|c| ConversationDetail {
        conversation: c.clone(),
        phase: store.phase(&id),
        streaming_message: store.streaming_message(&id).map(str::to_string),
    });
    match detail {
        Some(detail) => Ok(HttpResponse::Ok().json(detail)),
        None => Ok(HttpResponse::NotFound().finish()),
    }
}

#[delete("/{id}")]
pub async fn delete_conversation(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> WebResult<HttpResponse> {
    match state.delete_conversation(&id) {
        Ok(true) => Ok(HttpResponse::NoContent().finish()),
        Ok(false) => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Ok(error_response(&e)),
    }
}

#[post("/{id}/stop")]
pub async fn stop_conversation(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> WebResult<HttpResponse> {
    let stopped = state.stop(&id);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "stopped": stopped })))
}

// --- Files ---

#[get("")]
pub async fn list_files(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    let files = state.store().files().to_vec();
    Ok(HttpResponse::Ok().json(files))
}

#[post("")]
pub async fn upload_file(
    state: web::Data<AppState>,
    file: web::Json<UploadedFile>,
) -> WebResult<HttpResponse> {
    let file = file.into_inner();
    let name = file.name.clone();
    state.add_file(file);
    Ok(HttpResponse::Created().json(serde_json::json!({ "name": name })))
}

#[delete("")]
pub async fn clear_files(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    state.store().clear_files();
    Ok(HttpResponse::NoContent().finish())
}

#[delete("/{name}")]
pub async fn remove_file(
    state: web::Data<AppState>,
    name: web::Path<String>,
) -> WebResult<HttpResponse> {
    if state.store().remove_file(&name) {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Ok(HttpResponse::NotFound().finish())
    }
}

// --- Theme ---

#[get("/theme")]
pub async fn get_theme(state: web::Data<AppState>) -> WebResult<HttpResponse> {
    let theme = state.store().theme();
    Ok(HttpResponse::Ok().json(ThemeBody { theme }))
}

#[put("/theme")]
pub async fn set_theme(
    state: web::Data<AppState>,
    body: web::Json<ThemeBody>,
) -> WebResult<HttpResponse> {
    let theme = body.into_inner().theme;
    match state.set_theme(theme) {
        Ok(()) => Ok(HttpResponse::Ok().json(ThemeBody { theme })),
        Err(e) => Ok(error_response(&e)),
    }
}

// --- Chat ---

#[post("/chat")]
pub async fn chat(
    state: web::Data<AppState>,
    req: web::Json<ChatTurnRequest>,
) -> WebResult<HttpResponse> {
    let req = req.into_inner();
    let provider = req.provider.unwrap_or_else(|| state.default_provider());

    let (submission, files) = match state.begin_turn(req.conversation_id.as_deref(), &req.content) {
        Ok(Some(turn)) => turn,
        Ok(None) => return Ok(HttpResponse::NoContent().finish()),
        Err(e) => return Ok(error_response(&e)),
    };
    let conversation_id = submission.conversation_id.clone();

    // The dispatcher reports chunks through a sync callback, hence unbounded.
    let (tx, mut rx) = mpsc::unbounded_channel::<ChatEvent>();
    let state = state.into_inner();

    tokio::spawn(async move {
        let chunk_tx = tx.clone();
        let mut on_chunk = move |text: &str| {
            let _ = chunk_tx.send(ChatEvent::Chunk {
                content: text.to_string(),
            });
        };

        let event = match state.run_turn(submission, files, provider, &mut on_chunk).await {
            Ok(TurnOutcome::Completed { message, .. }) => ChatEvent::Done { message },
            Ok(TurnOutcome::Cancelled { .. }) => ChatEvent::Cancelled,
            Err(e) => ChatEvent::Error {
                message: e.user_message(),
            },
        };
        let _ = tx.send(event);
    });

    let started = ChatEvent::Started { conversation_id }.to_sse();
    let stream = async_stream::stream! {
        yield Ok::<Bytes, actix_web::Error>(Bytes::from(started));
        while let Some(event) = rx.recv().await {
            yield Ok::<Bytes, actix_web::Error>(Bytes::from(event.to_sse()));
        }
    };

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/conversations")
            .service(list_conversations)
            .service(create_conversation)
            .service(clear_conversations)
            .service(get_conversation)
            .service(delete_conversation)
            .service(stop_conversation),
    )
    .service(
        web::scope("/files")
            .service(list_files)
            .service(upload_file)
            .service(clear_files)
            .service(remove_file),
    )
    .service(get_theme)
    .service(set_theme)
    .service(chat);
}
