use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::Filter;

use crate::models::DepositStatus;
use crate::store::DepositStore;

#[derive(Debug, Deserialize)]
struct ListQuery {
	status: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error: String,
}

fn parse_statuses(raw: Option<&str>) -> Result<Vec<DepositStatus>, String> {
	match raw {
		None => Ok(vec![DepositStatus::Unconfirmed, DepositStatus::Confirming]),
		Some(raw) => raw
			.split(',')
			.map(|s| match s.trim().to_ascii_uppercase().as_str() {
				"UNCONFIRMED" => Ok(DepositStatus::Unconfirmed),
				"CONFIRMING" => Ok(DepositStatus::Confirming),
				"CONFIRMED" => Ok(DepositStatus::Confirmed),
				other => Err(format!("unknown status {other}")),
			})
			.collect(),
	}
}

async fn list_deposits(
	query: ListQuery,
	store: Arc<dyn DepositStore>,
) -> Result<Box<dyn warp::Reply>, Infallible> {
	let statuses = match parse_statuses(query.status.as_deref()) {
		Ok(statuses) => statuses,
		Err(reason) => {
			return Ok(Box::new(warp::reply::with_status(
				warp::reply::json(&ErrorBody { error: reason }),
				StatusCode::BAD_REQUEST,
			)));
		},
	};

	match store.find_by_status_in(&statuses).await {
		Ok(deposits) => Ok(Box::new(warp::reply::json(&deposits))),
		Err(e) => {
			tracing::error!(error = %e, "failed to list deposits");
			Ok(Box::new(warp::reply::with_status(
				warp::reply::json(&ErrorBody { error: "internal error".to_string() }),
				StatusCode::INTERNAL_SERVER_ERROR,
			)))
		},
	}
}

async fn health() -> Result<impl warp::Reply, Infallible> {
	Ok(warp::reply::with_status("ok", StatusCode::OK))
}

fn with_store(
	store: Arc<dyn DepositStore>,
) -> impl Filter<Extract = (Arc<dyn DepositStore>,), Error = Infallible> + Clone {
	warp::any().map(move || store.clone())
}

/// Builds the read-only listing API: `GET /deposits?status=CONFIRMING,CONFIRMED`
/// and `GET /healthz`. A supplemented surface, not part of the core watching
/// pipeline — nothing here ever mutates a [`Deposit`].
pub fn routes(
	store: Arc<dyn DepositStore>,
) -> impl Filter<Extract = (Box<dyn warp::Reply>,), Error = warp::Rejection> + Clone {
	let deposits = warp::path("deposits")
		.and(warp::get())
		.and(warp::query::<ListQuery>())
		.and(with_store(store))
		.and_then(|query, store| async move { list_deposits(query, store).await });

	let healthz = warp::path("healthz")
		.and(warp::get())
		.and_then(|| async move { health().await.map(|r| Box::new(r) as Box<dyn warp::Reply>) });

	deposits.or(healthz).unify().boxed()
}

pub async fn serve(store: Arc<dyn DepositStore>, addr: SocketAddr) {
	tracing::info!(%addr, "http listing endpoint starting");
	warp::serve(routes(store)).run(addr).await;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_status_filter_is_pending_states() {
		let statuses = parse_statuses(None).unwrap();
		assert_eq!(statuses, vec![DepositStatus::Unconfirmed, DepositStatus::Confirming]);
	}

	#[test]
	fn parses_comma_separated_statuses_case_insensitively() {
		let statuses = parse_statuses(Some("confirmed, Unconfirmed")).unwrap();
		assert_eq!(statuses, vec![DepositStatus::Confirmed, DepositStatus::Unconfirmed]);
	}

	#[test]
	fn rejects_unknown_status() {
		assert!(parse_statuses(Some("bogus")).is_err());
	}
}
