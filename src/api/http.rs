//! HTTP routes (warp-based).

use std::convert::Infallible;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::common::error::ServeError;
use crate::data::domain::FeatureVector;
use crate::inference::domain::{ModelStore, PredictionResponse};
use crate::inference::service;
use crate::inference::workers::LoggerHandle;
use crate::training::domain::ModelName;

const WELCOME: &str = "AMMI Program - Mlops Lab";
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ModelStore>,
    pub logger: LoggerHandle,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
    code: String,
}

/// Build every route. Pair with `.recover(handle_rejection)`.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({ "status": "healthy" })));

    let root = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({ "message": WELCOME })));

    let models = warp::path("models")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|state: AppState| {
            warp::reply::json(&serde_json::json!({ "models": state.store.names() }))
        });

    let predict = warp::path("predict")
        .and(warp::path::param::<ModelName>())
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(handle_predict);

    health.or(root).or(models).or(predict)
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn handle_predict(
    name: ModelName,
    features: FeatureVector,
    state: AppState,
) -> Result<warp::reply::Response, Infallible> {
    match service::predict(&state.store, name, &features) {
        Ok(record) => {
            let body = PredictionResponse {
                predictions: record.species,
            };
            state.logger.submit(record);
            Ok(warp::reply::json(&body).into_response())
        }
        Err(err) => {
            if err.is_client_error() {
                warn!(model = %name, error = %err, "prediction rejected");
            } else {
                error!(model = %name, error = %err, "prediction failed");
            }
            Ok(serve_error_response(&err))
        }
    }
}

fn status_for(err: &ServeError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> warp::reply::Response {
    let body = ApiError {
        error: message.to_string(),
        code: code.to_string(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn serve_error_response(err: &ServeError) -> warp::reply::Response {
    error_response(status_for(err), err.code().as_str(), &err.to_string())
}

/// Map warp rejections to JSON error bodies.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let response = if err.is_not_found() {
        error_response(StatusCode::NOT_FOUND, "not_found", "Not Found")
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_input",
            &format!("Invalid request body: {e}"),
        )
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            "Request payload too large",
        )
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        error_response(
            StatusCode::LENGTH_REQUIRED,
            "length_required",
            "Content-Length header required",
        )
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        error_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported_media_type",
            "Expected a JSON body",
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "Method Not Allowed",
        )
    } else {
        error!(?err, "unhandled rejection");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "Internal Server Error",
        )
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::service::iris;
    use crate::inference::domain::PredictionRecord;
    use crate::inference::workers::PredictionLogger;
    use crate::training::domain::{Predictor, Trainer};
    use crate::training::forest::ForestTrainer;
    use crate::training::logistic::LogisticTrainer;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    struct Harness {
        _dir: tempfile::TempDir,
        log_path: PathBuf,
        logger: PredictionLogger,
        state: AppState,
    }

    fn harness(store: ModelStore) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("predictions.json");
        let logger = PredictionLogger::spawn(&log_path, Duration::ZERO, 64);
        let state = AppState {
            store: Arc::new(store),
            logger: logger.handle(),
        };
        Harness {
            _dir: dir,
            log_path,
            logger,
            state,
        }
    }

    fn trained_store() -> ModelStore {
        let data = iris().unwrap();
        let forest = ForestTrainer {
            n_trees: 15,
            ..ForestTrainer::default()
        };
        let mut store = ModelStore::new();
        for trainer in [&LogisticTrainer::default() as &dyn Trainer, &forest] {
            store.insert(trainer.name(), trainer.fit(&data).unwrap().into_predictor());
        }
        store
    }

    fn logged(path: &Path) -> Vec<PredictionRecord> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap(),
            Err(_) => Vec::new(),
        }
    }

    async fn post(state: &AppState, path: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
        let resp = warp::test::request()
            .method("POST")
            .path(path)
            .json(&body)
            .reply(&routes(state.clone()).recover(handle_rejection))
            .await;
        let json = serde_json::from_slice(resp.body()).unwrap_or(serde_json::Value::Null);
        (resp.status().as_u16(), json)
    }

    async fn get(state: &AppState, path: &str) -> (u16, serde_json::Value) {
        let resp = warp::test::request()
            .method("GET")
            .path(path)
            .reply(&routes(state.clone()).recover(handle_rejection))
            .await;
        let json = serde_json::from_slice(resp.body()).unwrap_or(serde_json::Value::Null);
        (resp.status().as_u16(), json)
    }

    fn setosa_body() -> serde_json::Value {
        serde_json::json!({
            "sepalLength": 5.1,
            "sepalWidth": 3.5,
            "petalLength": 1.4,
            "petalWidth": 0.2
        })
    }

    #[tokio::test]
    async fn health_and_root() {
        let h = harness(ModelStore::new());
        assert_eq!(
            get(&h.state, "/health").await,
            (200, serde_json::json!({ "status": "healthy" }))
        );
        assert_eq!(
            get(&h.state, "/").await,
            (200, serde_json::json!({ "message": "AMMI Program - Mlops Lab" }))
        );
    }

    #[tokio::test]
    async fn models_lists_loaded_names_idempotently() {
        let h = harness(trained_store());
        let first = get(&h.state, "/models").await;
        assert_eq!(
            first,
            (
                200,
                serde_json::json!({ "models": ["logistic_regression", "random_forest"] })
            )
        );
        assert_eq!(get(&h.state, "/models").await, first);
    }

    #[tokio::test]
    async fn setosa_archetype_predicts_setosa_and_is_logged() {
        let h = harness(trained_store());
        let (status, body) = post(&h.state, "/predict/logistic_regression", setosa_body()).await;
        assert_eq!(status, 200);
        assert_eq!(body, serde_json::json!({ "predictions": "setosa" }));

        h.logger.shutdown().await;
        let records = logged(&h.log_path);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model, "logistic regression");
        assert_eq!(records[0].features, FeatureVector::new(5.1, 3.5, 1.4, 0.2));
    }

    #[tokio::test]
    async fn empty_body_uses_default_features() {
        let h = harness(trained_store());
        let (status, body) =
            post(&h.state, "/predict/random_forest", serde_json::json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(body, serde_json::json!({ "predictions": "setosa" }));
    }

    #[tokio::test]
    async fn n_sequential_predictions_are_logged_in_order() {
        let h = harness(trained_store());
        let bodies = [
            (
                "/predict/logistic_regression",
                serde_json::json!({"sepalLength": 5.0, "sepalWidth": 3.4, "petalLength": 1.5, "petalWidth": 0.2}),
            ),
            (
                "/predict/random_forest",
                serde_json::json!({"sepalLength": 5.9, "sepalWidth": 2.8, "petalLength": 4.3, "petalWidth": 1.3}),
            ),
            (
                "/predict/random_forest",
                serde_json::json!({"sepalLength": 7.2, "sepalWidth": 3.6, "petalLength": 6.1, "petalWidth": 2.5}),
            ),
        ];
        let mut labels = Vec::new();
        for (path, body) in &bodies {
            let (status, resp) = post(&h.state, path, body.clone()).await;
            assert_eq!(status, 200);
            labels.push(resp["predictions"].as_str().unwrap().to_string());
        }

        h.logger.shutdown().await;
        let records = logged(&h.log_path);
        assert_eq!(records.len(), 3);
        let models: Vec<_> = records.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(models, ["logistic regression", "Random Forest", "Random Forest"]);
        for ((record, (_, body)), label) in records.iter().zip(&bodies).zip(&labels) {
            assert_eq!(record.species.as_str(), label);
            assert_eq!(
                serde_json::to_value(record.features).unwrap(),
                *body
            );
        }
    }

    #[tokio::test]
    async fn out_of_range_features_are_rejected_and_not_logged() {
        let h = harness(trained_store());
        for body in [
            serde_json::json!({"sepalLength": 0}),
            serde_json::json!({"sepalWidth": -2.0}),
            serde_json::json!({"petalLength": 7.5}),
            serde_json::json!({"petalWidth": 3.0}),
        ] {
            let (status, resp) = post(&h.state, "/predict/random_forest", body).await;
            assert_eq!(status, 422);
            assert_eq!(resp["code"], "invalid_input");
        }

        let stats = h.logger.shutdown().await;
        assert_eq!(stats.written, 0);
        assert!(logged(&h.log_path).is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_422() {
        let h = harness(trained_store());
        let (status, resp) = post(
            &h.state,
            "/predict/logistic_regression",
            serde_json::json!({"sepalLength": "long"}),
        )
        .await;
        assert_eq!(status, 422);
        assert_eq!(resp["code"], "invalid_input");
    }

    #[tokio::test]
    async fn unloaded_model_is_a_server_error() {
        let h = harness(ModelStore::new());
        let (status, resp) = post(&h.state, "/predict/random_forest", setosa_body()).await;
        assert_eq!(status, 500);
        assert_eq!(resp["code"], "model_not_found");
        assert_eq!(get(&h.state, "/models").await.1, serde_json::json!({ "models": [] }));
    }

    #[tokio::test]
    async fn unknown_class_index_is_a_server_error_and_not_logged() {
        #[derive(Debug)]
        struct FourClasses;

        impl Predictor for FourClasses {
            fn kind(&self) -> ModelName {
                ModelName::RandomForest
            }

            fn predict_proba(
                &self,
                _: &[f64; crate::data::domain::N_FEATURES],
            ) -> crate::common::error::ServeResult<Vec<f64>> {
                Ok(vec![0.0, 0.1, 0.2, 0.7])
            }
        }

        let mut store = ModelStore::new();
        store.insert(ModelName::RandomForest, Arc::new(FourClasses));
        let h = harness(store);

        let (status, resp) = post(&h.state, "/predict/random_forest", setosa_body()).await;
        assert_eq!(status, 500);
        assert_eq!(resp["code"], "unknown_class");

        let stats = h.logger.shutdown().await;
        assert_eq!(stats.written, 0);
    }

    #[tokio::test]
    async fn unknown_routes_and_methods() {
        let h = harness(trained_store());
        assert_eq!(post(&h.state, "/predict/svm", setosa_body()).await.0, 404);
        assert_eq!(get(&h.state, "/nope").await.0, 404);
        assert_eq!(get(&h.state, "/predict/random_forest").await.0, 405);
    }
}
