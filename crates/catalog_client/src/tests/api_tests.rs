use super::*;
use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use shared::protocol::ImageResource;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServiceState {
    batches: Arc<Mutex<Vec<ImageCollection>>>,
    jobs: Arc<Mutex<Vec<(String, RunJobRequest)>>>,
}

async fn add_images(
    State(state): State<ServiceState>,
    Json(batch): Json<ImageCollection>,
) -> Json<ItemList<ImageRecord>> {
    let created = batch
        .items
        .iter()
        .enumerate()
        .map(|(i, r)| ImageRecord {
            id: Some(r.id.clone().unwrap_or_else(|| ImageId(format!("gen-{i}")))),
            url: r.url.clone(),
            tags: r.tags.clone(),
            selected: false,
        })
        .collect();
    state.batches.lock().await.push(batch);
    Json(ItemList::new(created))
}

async fn list_images(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    if let Some(tag) = query.get("tag") {
        if tag == "none" {
            return StatusCode::NOT_FOUND.into_response();
        }
        return Json(ItemList::new(vec![
            IdReference { id: "a".into() },
            IdReference { id: "b".into() },
        ]))
        .into_response();
    }
    if let Some(url) = query.get("url") {
        return Json(ItemList::new(vec![IdReference {
            id: ImageId(format!("by-url:{url}")),
        }]))
        .into_response();
    }
    Json(ItemList::new(vec![ImageRecord::new("a", "http://x/a.jpg")])).into_response()
}

async fn get_image(Path(id): Path<String>) -> impl IntoResponse {
    match id.as_str() {
        "missing" => StatusCode::NOT_FOUND.into_response(),
        "null" => Json(serde_json::Value::Null).into_response(),
        _ => Json(ImageRecord::new(id.as_str(), format!("http://x/{id}.jpg"))).into_response(),
    }
}

async fn rfw_status() -> Json<RfwStatus> {
    Json(RfwStatus { enabled: true })
}

async fn rfw_policies() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn run_job(
    State(state): State<ServiceState>,
    Path(policy_id): Path<String>,
    Json(request): Json<RunJobRequest>,
) -> StatusCode {
    state.jobs.lock().await.push((policy_id, request));
    StatusCode::ACCEPTED
}

async fn get_job(Path(policy_id): Path<String>) -> impl IntoResponse {
    if policy_id == "broken" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ProblemDetail::new("Job store offline").with_detail("retry later")),
        )
            .into_response();
    }
    Json(serde_json::json!({
        "policy_id": policy_id,
        "status": "running",
        "processed": 3,
    }))
    .into_response()
}

async fn spawn_image_service() -> Result<(String, ServiceState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServiceState::default();
    let api = Router::new()
        .route("/images", post(add_images).get(list_images))
        .route("/images/:id", get(get_image))
        .route("/rfw/status", get(rfw_status))
        .route("/rfw/policies", get(rfw_policies))
        .route("/rfw/policies/:policy_id/jobs", post(run_job).get(get_job))
        .with_state(state.clone());
    let app = Router::new().nest("/api", api);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api"), state))
}

#[test]
fn rejects_non_http_base_urls() {
    assert!(HttpImageApi::new("ftp://example.com/images").is_err());
    assert!(HttpImageApi::new("not a url").is_err());
    assert!(HttpImageApi::new("https://example.com/imaging/v0").is_ok());
}

#[test]
fn endpoints_extend_the_base_path_and_escape_segments() {
    let api = HttpImageApi::new("https://example.com/imaging/v0/").expect("base url");
    assert_eq!(
        api.endpoint(&["images", "a b/c"]).as_str(),
        "https://example.com/imaging/v0/images/a%20b%2Fc"
    );
}

#[tokio::test]
async fn add_images_posts_the_batch_and_decodes_created_items() {
    let (base, state) = spawn_image_service().await.expect("spawn service");
    let api = HttpImageApi::new(&base).expect("client");

    let batch = ImageCollection {
        items: vec![ImageResource {
            url: "http://x/a.jpg".into(),
            id: None,
            tags: Some(vec!["t1".into()]),
        }],
    };
    let created = api
        .add_images(&batch)
        .await
        .expect("request")
        .expect("created items");

    assert_eq!(created.items.len(), 1);
    assert_eq!(created.items[0].id, Some(ImageId::from("gen-0")));
    assert_eq!(state.batches.lock().await.as_slice(), &[batch]);
}

#[tokio::test]
async fn queries_map_missing_and_empty_responses_to_none() {
    let (base, _) = spawn_image_service().await.expect("spawn service");
    let api = HttpImageApi::new(&base).expect("client");

    let all = api.get_all_images().await.expect("all").expect("list");
    assert_eq!(all.items.len(), 1);

    let refs = api.get_images_by_tag("promo").await.expect("tag").expect("refs");
    assert_eq!(refs.items.len(), 2);
    assert!(api.get_images_by_tag("none").await.expect("tag").is_none());

    let by_url = api
        .get_images_by_url("http://x/a.jpg")
        .await
        .expect("url")
        .expect("refs");
    assert_eq!(by_url.items[0].id, ImageId::from("by-url:http://x/a.jpg"));

    assert!(api.get_image(&"missing".into()).await.expect("get").is_none());
    assert!(api.get_image(&"null".into()).await.expect("get").is_none());
    let image = api.get_image(&"b".into()).await.expect("get").expect("image");
    assert_eq!(image.url, "http://x/b.jpg");
    assert!(!image.selected);

    assert!(api.get_rfw_policies().await.expect("policies").is_none());
    assert!(api.rfw_status().await.expect("status"));
}

#[tokio::test]
async fn run_image_job_posts_to_policy_jobs() {
    let (base, state) = spawn_image_service().await.expect("spawn service");
    let api = HttpImageApi::new(&base).expect("client");

    api.run_image_job(&"img-1".into(), &"policy-9".into(), "Promo")
        .await
        .expect("job accepted");

    let jobs = state.jobs.lock().await.clone();
    assert_eq!(
        jobs,
        vec![(
            "policy-9".to_string(),
            RunJobRequest {
                image_id: "img-1".into(),
                tag: "Promo".into(),
            }
        )]
    );
}

#[tokio::test]
async fn get_job_decodes_status_and_surfaces_service_errors() {
    let (base, _) = spawn_image_service().await.expect("spawn service");
    let api = HttpImageApi::new(&base).expect("client");

    let status = api.get_job(&"p1".into()).await.expect("status");
    assert_eq!(status.status, "running");
    assert_eq!(status.details.get("processed"), Some(&serde_json::json!(3)));

    let err = api.get_job(&"broken".into()).await.unwrap_err();
    let service_error = err.downcast_ref::<ServiceError>().expect("service error");
    assert_eq!(service_error.status, 500);
    assert_eq!(service_error.problem.title, "Job store offline");
    assert!(err.to_string().contains("retry later"));
}
