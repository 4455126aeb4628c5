// src/challenge.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{error, info};
use mongodb::bson::{doc, to_bson};
use mongodb::options::ReturnDocument;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::ledger;
use crate::quiz::Difficulty;
use crate::store;
use crate::user_management::Role;
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Active,
    Pending,
    Inactive,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Active => "active",
            ChallengeStatus::Pending => "pending",
            ChallengeStatus::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ParticipationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipationStatus::Pending => "pending",
            ParticipationStatus::Approved => "approved",
            ParticipationStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: String,
    pub title: String,
    pub description: String,
    pub created_by: String,
    /// Free-text requirements the evidence is judged against.
    pub requirements: Vec<String>,
    pub points: i64,
    pub difficulty: Difficulty,
    /// Minutes, descriptive only.
    pub estimated_time: i32,
    /// Only active challenges are visible to customers.
    pub status: ChallengeStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeParticipation {
    pub participation_id: String,
    pub challenge_id: String,
    pub user_id: String,
    pub evidence: String,
    pub status: ParticipationStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChallengeRequest {
    pub title: String,
    pub description: String,
    pub requirements: Vec<String>,
    pub points: i64,
    pub difficulty: Difficulty,
    pub estimated_time: i32,
    pub status: ChallengeStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChallengeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub requirements: Option<Vec<String>>,
    pub points: Option<i64>,
    pub difficulty: Option<Difficulty>,
    pub estimated_time: Option<i32>,
    pub status: Option<ChallengeStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ParticipateRequest {
    pub evidence: String,
}

#[derive(Debug, Deserialize)]
pub struct ParticipationQuery {
    pub status: Option<ParticipationStatus>,
    pub challenge_id: Option<String>,
}

/// POST /challenges
pub async fn create_challenge(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateChallengeRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }

    let errors = validation::validate_challenge(&payload);
    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "errors": errors }));
    }

    let new_challenge = Challenge {
        challenge_id: Uuid::new_v4().to_string(),
        title: payload.title.clone(),
        description: payload.description.clone(),
        created_by: auth.user_id,
        requirements: payload.requirements.clone(),
        points: payload.points,
        difficulty: payload.difficulty,
        estimated_time: payload.estimated_time,
        status: payload.status,
        created_at: Utc::now(),
    };

    let challenges = data.mongodb.db.collection::<Challenge>(store::CHALLENGES);
    match challenges.insert_one(&new_challenge).await {
        Ok(_) => {
            info!("Challenge created: {}", new_challenge.challenge_id);
            HttpResponse::Ok().json(&new_challenge)
        }
        Err(e) => {
            error!("Error inserting challenge: {}", e);
            HttpResponse::InternalServerError().body("Error creating challenge")
        }
    }
}

/// GET /challenges: customers only see active ones.
pub async fn list_challenges(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let filter = if auth.role == Role::Admin {
        doc! {}
    } else {
        doc! { "status": "active" }
    };

    let challenges = data.mongodb.db.collection::<Challenge>(store::CHALLENGES);
    let mut cursor = match challenges.find(filter).await {
        Ok(cur) => cur,
        Err(e) => {
            error!("Error fetching challenges: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching challenges");
        }
    };

    let mut results = vec![];
    while let Some(challenge_res) = cursor.next().await {
        match challenge_res {
            Ok(challenge) => results.push(challenge),
            Err(e) => {
                error!("Error reading challenges cursor: {}", e);
                return HttpResponse::InternalServerError().body("Error reading challenges");
            }
        }
    }
    HttpResponse::Ok().json(results)
}

/// GET /challenges/{challenge_id}
pub async fn get_challenge(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let challenge_id = path.into_inner();

    let challenges = data.mongodb.db.collection::<Challenge>(store::CHALLENGES);
    match challenges.find_one(doc! { "challenge_id": &challenge_id }).await {
        Ok(Some(challenge)) => {
            if auth.role != Role::Admin && challenge.status != ChallengeStatus::Active {
                return HttpResponse::NotFound().body("Challenge not found");
            }
            HttpResponse::Ok().json(challenge)
        }
        Ok(None) => HttpResponse::NotFound().body("Challenge not found"),
        Err(e) => {
            error!("Error fetching challenge {}: {}", challenge_id, e);
            HttpResponse::InternalServerError().body("Error fetching challenge")
        }
    }
}

/// PUT /challenges/{challenge_id}
pub async fn update_challenge(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateChallengeRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }
    let challenge_id = path.into_inner();

    let errors = validation::validate_challenge_update(&payload);
    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "errors": errors }));
    }

    let mut update_doc = doc! {};
    if let Some(title) = &payload.title {
        update_doc.insert("title", title);
    }
    if let Some(description) = &payload.description {
        update_doc.insert("description", description);
    }
    if let Some(requirements) = &payload.requirements {
        match to_bson(requirements) {
            Ok(bson) => {
                update_doc.insert("requirements", bson);
            }
            Err(e) => {
                error!("Error encoding requirements: {}", e);
                return HttpResponse::InternalServerError().body("Error updating challenge");
            }
        }
    }
    if let Some(points) = payload.points {
        update_doc.insert("points", points);
    }
    if let Some(difficulty) = &payload.difficulty {
        update_doc.insert("difficulty", difficulty.as_str());
    }
    if let Some(estimated_time) = payload.estimated_time {
        update_doc.insert("estimated_time", estimated_time);
    }
    if let Some(status) = &payload.status {
        update_doc.insert("status", status.as_str());
    }
    if update_doc.is_empty() {
        return HttpResponse::BadRequest().body("No fields to update");
    }

    let challenges = data.mongodb.db.collection::<Challenge>(store::CHALLENGES);
    match challenges
        .update_one(doc! { "challenge_id": &challenge_id }, doc! { "$set": update_doc })
        .await
    {
        Ok(res) => {
            if res.matched_count == 0 {
                HttpResponse::NotFound().body("Challenge not found")
            } else {
                HttpResponse::Ok().body("Challenge updated")
            }
        }
        Err(e) => {
            error!("Error updating challenge {}: {}", challenge_id, e);
            HttpResponse::InternalServerError().body("Error updating challenge")
        }
    }
}

/// DELETE /challenges/{challenge_id}
pub async fn delete_challenge(
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
    let challenge_id = path.into_inner();

    let challenges = data.mongodb.db.collection::<Challenge>(store::CHALLENGES);
    match challenges.delete_one(doc! { "challenge_id": &challenge_id }).await {
        Ok(res) => {
            if res.deleted_count == 0 {
                HttpResponse::NotFound().body("Challenge not found or already deleted")
            } else {
                HttpResponse::Ok().body("Challenge deleted")
            }
        }
        Err(e) => {
            error!("Error deleting challenge {}: {}", challenge_id, e);
            HttpResponse::InternalServerError().body("Error deleting challenge")
        }
    }
}

/// POST /challenges/{challenge_id}/participate: a customer claims
/// completion. One open (pending or approved) claim per challenge and
/// user; the claim is created with an upsert so a repeat request finds
/// the existing one instead of inserting a duplicate.
pub async fn participate(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<ParticipateRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let challenge_id = path.into_inner();

    let challenges = data.mongodb.db.collection::<Challenge>(store::CHALLENGES);
    let challenge = match challenges.find_one(doc! { "challenge_id": &challenge_id }).await {
        Ok(Some(challenge)) => challenge,
        Ok(None) => return HttpResponse::NotFound().body("Challenge not found"),
        Err(e) => {
            error!("Error fetching challenge {}: {}", challenge_id, e);
            return HttpResponse::InternalServerError().body("Error submitting participation");
        }
    };
    if challenge.status != ChallengeStatus::Active {
        return HttpResponse::Conflict().body("Challenge is not open for participation");
    }

    let participation_id = Uuid::new_v4().to_string();
    let participations = data
        .mongodb
        .db
        .collection::<ChallengeParticipation>(store::PARTICIPATIONS);
    let result = participations
        .update_one(
            doc! {
                "challenge_id": &challenge_id,
                "user_id": &auth.user_id,
                "status": { "$in": ["pending", "approved"] },
            },
            doc! { "$setOnInsert": {
                "participation_id": &participation_id,
                "challenge_id": &challenge_id,
                "user_id": &auth.user_id,
                "evidence": &payload.evidence,
                "status": "pending",
                "submitted_at": Utc::now().to_rfc3339(),
                "reviewed_at": null,
            } },
        )
        .upsert(true)
        .await;

    match result {
        Ok(res) if res.upserted_id.is_some() => {
            info!(
                "Participation {} submitted for challenge {} by {}",
                participation_id, challenge_id, auth.user_id
            );
            HttpResponse::Ok().json(serde_json::json!({
                "participation_id": participation_id,
                "challenge_id": challenge_id,
                "status": ParticipationStatus::Pending,
            }))
        }
        Ok(_) => HttpResponse::Conflict().body("Already submitted for this challenge"),
        Err(e) => {
            error!("Error recording participation: {}", e);
            HttpResponse::InternalServerError().body("Error submitting participation")
        }
    }
}

/// GET /challenges/participations: admin review queue.
pub async fn list_participations(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<ParticipationQuery>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }

    let mut filter = doc! {};
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    if let Some(challenge_id) = &query.challenge_id {
        filter.insert("challenge_id", challenge_id);
    }

    let participations = data
        .mongodb
        .db
        .collection::<ChallengeParticipation>(store::PARTICIPATIONS);
    let mut cursor = match participations.find(filter).await {
        Ok(cur) => cur,
        Err(e) => {
            error!("Error fetching participations: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching participations");
        }
    };

    let mut results = vec![];
    while let Some(participation_res) = cursor.next().await {
        match participation_res {
            Ok(participation) => results.push(participation),
            Err(e) => {
                error!("Error reading participations cursor: {}", e);
                return HttpResponse::InternalServerError().body("Error reading participations");
            }
        }
    }
    HttpResponse::Ok().json(results)
}

/// GET /challenges/participations/mine
pub async fn my_participations(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let participations = data
        .mongodb
        .db
        .collection::<ChallengeParticipation>(store::PARTICIPATIONS);
    let mut cursor = match participations.find(doc! { "user_id": &auth.user_id }).await {
        Ok(cur) => cur,
        Err(e) => {
            error!("Error fetching participations for {}: {}", auth.user_id, e);
            return HttpResponse::InternalServerError().body("Error fetching participations");
        }
    };

    let mut results = vec![];
    while let Some(participation_res) = cursor.next().await {
        match participation_res {
            Ok(participation) => results.push(participation),
            Err(e) => {
                error!("Error reading participations cursor: {}", e);
                return HttpResponse::InternalServerError().body("Error reading participations");
            }
        }
    }
    HttpResponse::Ok().json(results)
}

/// POST /challenges/participations/{id}/approve: flips the claim from
/// pending to approved and credits the challenge's points. The flip is
/// guarded on the current status, so only one approval can win and the
/// points are paid at most once.
pub async fn approve_participation(
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
    let participation_id = path.into_inner();

    let participations = data
        .mongodb
        .db
        .collection::<ChallengeParticipation>(store::PARTICIPATIONS);
    let participation = match participations
        .find_one(doc! { "participation_id": &participation_id })
        .await
    {
        Ok(Some(p)) => p,
        Ok(None) => return HttpResponse::NotFound().body("Participation not found"),
        Err(e) => {
            error!("Error fetching participation {}: {}", participation_id, e);
            return HttpResponse::InternalServerError().body("Error approving participation");
        }
    };

    let challenges = data.mongodb.db.collection::<Challenge>(store::CHALLENGES);
    let challenge = match challenges
        .find_one(doc! { "challenge_id": &participation.challenge_id })
        .await
    {
        Ok(Some(challenge)) => challenge,
        Ok(None) => return HttpResponse::Conflict().body("Challenge no longer exists"),
        Err(e) => {
            error!("Error fetching challenge {}: {}", participation.challenge_id, e);
            return HttpResponse::InternalServerError().body("Error approving participation");
        }
    };

    let flipped = match participations
        .find_one_and_update(
            doc! { "participation_id": &participation_id, "status": "pending" },
            doc! { "$set": { "status": "approved", "reviewed_at": Utc::now().to_rfc3339() } },
        )
        .return_document(ReturnDocument::After)
        .await
    {
        Ok(p) => p,
        Err(e) => {
            error!("Error approving participation {}: {}", participation_id, e);
            return HttpResponse::InternalServerError().body("Error approving participation");
        }
    };

    match flipped {
        Some(approved) => {
            if let Err(e) =
                ledger::credit(&data.mongodb.db, &approved.user_id, challenge.points).await
            {
                error!(
                    "Participation {} approved but crediting {} points to {} failed: {}",
                    participation_id, challenge.points, approved.user_id, e
                );
                return HttpResponse::InternalServerError()
                    .body("Participation approved but points could not be credited");
            }
            info!(
                "Participation {} approved, {} points to {}",
                participation_id, challenge.points, approved.user_id
            );
            HttpResponse::Ok().json(serde_json::json!({
                "participation_id": participation_id,
                "status": ParticipationStatus::Approved,
                "points_awarded": challenge.points,
            }))
        }
        None => HttpResponse::Conflict().body("Participation already reviewed"),
    }
}

/// POST /challenges/participations/{id}/reject
pub async fn reject_participation(
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
    let participation_id = path.into_inner();

    let participations = data
        .mongodb
        .db
        .collection::<ChallengeParticipation>(store::PARTICIPATIONS);
    let flipped = match participations
        .find_one_and_update(
            doc! { "participation_id": &participation_id, "status": "pending" },
            doc! { "$set": { "status": "rejected", "reviewed_at": Utc::now().to_rfc3339() } },
        )
        .return_document(ReturnDocument::After)
        .await
    {
        Ok(p) => p,
        Err(e) => {
            error!("Error rejecting participation {}: {}", participation_id, e);
            return HttpResponse::InternalServerError().body("Error rejecting participation");
        }
    };

    match flipped {
        Some(_) => HttpResponse::Ok().json(serde_json::json!({
            "participation_id": participation_id,
            "status": ParticipationStatus::Rejected,
        })),
        None => match participations
            .find_one(doc! { "participation_id": &participation_id })
            .await
        {
            Ok(Some(_)) => HttpResponse::Conflict().body("Participation already reviewed"),
            Ok(None) => HttpResponse::NotFound().body("Participation not found"),
            Err(e) => {
                error!("Error fetching participation {}: {}", participation_id, e);
                HttpResponse::InternalServerError().body("Error rejecting participation")
            }
        },
    }
}
