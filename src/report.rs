// src/report.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{error, info};
use mongodb::bson::doc;
use mongodb::options::ReturnDocument;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::ledger;
use crate::store;
use crate::user_management::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Collected,
    Processed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Collected => "collected",
            ReportStatus::Processed => "processed",
        }
    }
}

/// A reported device as stored in MongoDB.
#[derive(Debug, Serialize, Deserialize)]
pub struct EWasteReport {
    pub report_id: String,
    /// Owner of the report; points for its progress are credited here.
    pub user_id: String,
    pub device_type: String,
    pub brand: String,
    pub model: String,
    pub condition: String,
    pub location: String,
    pub status: ReportStatus,
    /// Stages this report has already been paid for. Written in the
    /// same update as the status flip, which is what keeps a stage from
    /// being paid twice.
    #[serde(default)]
    pub awarded_stages: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub device_type: String,
    pub brand: String,
    pub model: String,
    pub condition: String,
    pub location: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReportRequest {
    pub device_type: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub condition: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ReportStatus,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub status: Option<ReportStatus>,
}

/// POST /reports
pub async fn create_report(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateReportRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let new_report = EWasteReport {
        report_id: Uuid::new_v4().to_string(),
        user_id: auth.user_id,
        device_type: payload.device_type.clone(),
        brand: payload.brand.clone(),
        model: payload.model.clone(),
        condition: payload.condition.clone(),
        location: payload.location.clone(),
        status: ReportStatus::Pending,
        awarded_stages: Vec::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let reports = data.mongodb.db.collection::<EWasteReport>(store::REPORTS);
    match reports.insert_one(&new_report).await {
        Ok(_) => {
            info!("Report created: {}", new_report.report_id);
            HttpResponse::Ok().json(&new_report)
        }
        Err(e) => {
            error!("Error inserting report: {}", e);
            HttpResponse::InternalServerError().body("Error creating report")
        }
    }
}

/// GET /reports: admin listing, optionally filtered by status.
pub async fn list_reports(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<ReportQuery>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }

    let filter = match query.status {
        Some(status) => doc! { "status": status.as_str() },
        None => doc! {},
    };

    let reports = data.mongodb.db.collection::<EWasteReport>(store::REPORTS);
    let mut cursor = match reports.find(filter).await {
        Ok(cur) => cur,
        Err(e) => {
            error!("Error fetching reports: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching reports");
        }
    };

    let mut results = vec![];
    while let Some(report_res) = cursor.next().await {
        match report_res {
            Ok(report) => results.push(report),
            Err(e) => {
                error!("Error reading reports cursor: {}", e);
                return HttpResponse::InternalServerError().body("Error reading reports");
            }
        }
    }
    HttpResponse::Ok().json(results)
}

/// GET /reports/mine
pub async fn list_my_reports(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let reports = data.mongodb.db.collection::<EWasteReport>(store::REPORTS);
    let mut cursor = match reports.find(doc! { "user_id": &auth.user_id }).await {
        Ok(cur) => cur,
        Err(e) => {
            error!("Error fetching reports for {}: {}", auth.user_id, e);
            return HttpResponse::InternalServerError().body("Error fetching reports");
        }
    };

    let mut results = vec![];
    while let Some(report_res) = cursor.next().await {
        match report_res {
            Ok(report) => results.push(report),
            Err(e) => {
                error!("Error reading reports cursor: {}", e);
                return HttpResponse::InternalServerError().body("Error reading reports");
            }
        }
    }
    HttpResponse::Ok().json(results)
}

/// GET /reports/{report_id}: owner or admin.
pub async fn get_report(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let report_id = path.into_inner();

    let reports = data.mongodb.db.collection::<EWasteReport>(store::REPORTS);
    match reports.find_one(doc! { "report_id": &report_id }).await {
        Ok(Some(report)) => {
            if auth.role != Role::Admin && report.user_id != auth.user_id {
                return HttpResponse::Unauthorized().body("Cannot access other users' reports");
            }
            HttpResponse::Ok().json(report)
        }
        Ok(None) => HttpResponse::NotFound().body("Report not found"),
        Err(e) => {
            error!("Error fetching report {}: {}", report_id, e);
            HttpResponse::InternalServerError().body("Error fetching report")
        }
    }
}

/// PUT /reports/{report_id}: device attributes only. Owners may edit
/// while the report is still pending; admins any time.
pub async fn update_report(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateReportRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let report_id = path.into_inner();

    let mut update_doc = doc! {};
    if let Some(device_type) = &payload.device_type {
        update_doc.insert("device_type", device_type);
    }
    if let Some(brand) = &payload.brand {
        update_doc.insert("brand", brand);
    }
    if let Some(model) = &payload.model {
        update_doc.insert("model", model);
    }
    if let Some(condition) = &payload.condition {
        update_doc.insert("condition", condition);
    }
    if let Some(location) = &payload.location {
        update_doc.insert("location", location);
    }
    if update_doc.is_empty() {
        return HttpResponse::BadRequest().body("No fields to update");
    }
    update_doc.insert("updated_at", Utc::now().to_rfc3339());

    let filter = if auth.role == Role::Admin {
        doc! { "report_id": &report_id }
    } else {
        doc! { "report_id": &report_id, "user_id": &auth.user_id, "status": "pending" }
    };

    let reports = data.mongodb.db.collection::<EWasteReport>(store::REPORTS);
    match reports.update_one(filter, doc! { "$set": update_doc }).await {
        Ok(res) => {
            if res.matched_count == 0 {
                HttpResponse::NotFound().body("Report not found or no longer editable")
            } else {
                HttpResponse::Ok().body("Report updated")
            }
        }
        Err(e) => {
            error!("Error updating report {}: {}", report_id, e);
            HttpResponse::InternalServerError().body("Error updating report")
        }
    }
}

/// PUT /reports/{report_id}/status: admin transition. Forward progress
/// pays the owner through the ledger; a repeated request or a reverse
/// transition pays nothing. The status flip, the guard against
/// repeating it, and the record of paid stages are a single update.
pub async fn update_report_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateStatusRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }
    let report_id = path.into_inner();
    let target = payload.status;

    let stages = ledger::stage_names(target);
    let mut update = doc! {
        "$set": { "status": target.as_str(), "updated_at": Utc::now().to_rfc3339() },
    };
    if !stages.is_empty() {
        update.insert("$addToSet", doc! { "awarded_stages": { "$each": stages.to_vec() } });
    }

    let reports = data.mongodb.db.collection::<EWasteReport>(store::REPORTS);
    let previous = match reports
        .find_one_and_update(
            doc! { "report_id": &report_id, "status": { "$ne": target.as_str() } },
            update,
        )
        .return_document(ReturnDocument::Before)
        .await
    {
        Ok(p) => p,
        Err(e) => {
            error!("Error updating status of report {}: {}", report_id, e);
            return HttpResponse::InternalServerError().body("Error updating report status");
        }
    };

    match previous {
        Some(before) => {
            let delta = ledger::transition_award(&before.awarded_stages, target);
            if delta > 0 {
                if let Err(e) = ledger::credit(&data.mongodb.db, &before.user_id, delta).await {
                    error!(
                        "Report {} moved to {} but crediting {} points to {} failed: {}",
                        report_id,
                        target.as_str(),
                        delta,
                        before.user_id,
                        e
                    );
                    return HttpResponse::InternalServerError()
                        .body("Status updated but points could not be credited");
                }
                info!(
                    "Report {}: {} -> {}, awarded {} points to {}",
                    report_id,
                    before.status.as_str(),
                    target.as_str(),
                    delta,
                    before.user_id
                );
            }
            HttpResponse::Ok().json(serde_json::json!({
                "report_id": report_id,
                "status": target,
                "points_awarded": delta,
            }))
        }
        // No match: the report is gone, or already at the target status
        // (a duplicate click). The latter changes and pays nothing.
        None => match reports.find_one(doc! { "report_id": &report_id }).await {
            Ok(Some(_)) => HttpResponse::Ok().json(serde_json::json!({
                "report_id": report_id,
                "status": target,
                "points_awarded": 0,
            })),
            Ok(None) => HttpResponse::NotFound().body("Report not found"),
            Err(e) => {
                error!("Error fetching report {}: {}", report_id, e);
                HttpResponse::InternalServerError().body("Error updating report status")
            }
        },
    }
}

/// DELETE /reports/{report_id}
pub async fn delete_report(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }
    let report_id = path.into_inner();

    let reports = data.mongodb.db.collection::<EWasteReport>(store::REPORTS);
    match reports.delete_one(doc! { "report_id": &report_id }).await {
        Ok(res) => {
            if res.deleted_count == 0 {
                HttpResponse::NotFound().body("Report not found or already deleted")
            } else {
                HttpResponse::Ok().body("Report deleted")
            }
        }
        Err(e) => {
            error!("Error deleting report {}: {}", report_id, e);
            HttpResponse::InternalServerError().body("Error deleting report")
        }
    }
}
