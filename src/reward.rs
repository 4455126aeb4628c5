// src/reward.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{error, info};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::ledger::{self, LedgerError};
use crate::store;
use crate::user_management::Role;
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardStatus {
    Active,
    Inactive,
}

impl RewardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardStatus::Active => "active",
            RewardStatus::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardType {
    Coupon,
    Discount,
    Cashback,
    Voucher,
}

impl RewardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardType::Coupon => "coupon",
            RewardType::Discount => "discount",
            RewardType::Cashback => "cashback",
            RewardType::Voucher => "voucher",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Fixed,
    Percentage,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Fixed => "fixed",
            ValueType::Percentage => "percentage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Pending,
    Approved,
    Used,
    Expired,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Pending => "pending",
            RedemptionStatus::Approved => "approved",
            RedemptionStatus::Used => "used",
            RedemptionStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Reward {
    pub reward_id: String,
    pub title: String,
    pub description: String,
    pub reward_type: RewardType,
    pub value_type: ValueType,
    /// Currency amount for `fixed`, percent for `percentage`.
    pub value: f64,
    pub points_cost: i64,
    pub stock: i64,
    pub status: RewardStatus,
    pub expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RewardRedemption {
    pub redemption_id: String,
    pub reward_id: String,
    pub user_id: String,
    pub coupon_code: String,
    pub points_spent: i64,
    pub status: RedemptionStatus,
    pub redeemed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRewardRequest {
    pub title: String,
    pub description: String,
    pub reward_type: RewardType,
    pub value_type: ValueType,
    pub value: f64,
    pub points_cost: i64,
    pub stock: i64,
    pub status: RewardStatus,
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRewardRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub reward_type: Option<RewardType>,
    pub value_type: Option<ValueType>,
    pub value: Option<f64>,
    pub points_cost: Option<i64>,
    pub stock: Option<i64>,
    pub status: Option<RewardStatus>,
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRedemptionStatusRequest {
    pub status: RedemptionStatus,
}

fn is_expired(reward: &Reward) -> bool {
    matches!(reward.expiry_date, Some(expiry) if expiry <= Utc::now())
}

/// POST /rewards
pub async fn create_reward(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateRewardRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }

    let errors = validation::validate_reward(&payload);
    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "errors": errors }));
    }

    let new_reward = Reward {
        reward_id: Uuid::new_v4().to_string(),
        title: payload.title.clone(),
        description: payload.description.clone(),
        reward_type: payload.reward_type,
        value_type: payload.value_type,
        value: payload.value,
        points_cost: payload.points_cost,
        stock: payload.stock,
        status: payload.status,
        expiry_date: payload.expiry_date,
        created_at: Utc::now(),
    };

    let rewards = data.mongodb.db.collection::<Reward>(store::REWARDS);
    match rewards.insert_one(&new_reward).await {
        Ok(_) => {
            info!("Reward created: {}", new_reward.reward_id);
            HttpResponse::Ok().json(&new_reward)
        }
        Err(e) => {
            error!("Error inserting reward: {}", e);
            HttpResponse::InternalServerError().body("Error creating reward")
        }
    }
}

/// GET /rewards: customers see what they can actually redeem: active,
/// in stock, not expired.
pub async fn list_rewards(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let filter = if auth.role == Role::Admin {
        doc! {}
    } else {
        doc! { "status": "active", "stock": { "$gt": 0_i64 } }
    };

    let rewards = data.mongodb.db.collection::<Reward>(store::REWARDS);
    let mut cursor = match rewards.find(filter).await {
        Ok(cur) => cur,
        Err(e) => {
            error!("Error fetching rewards: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching rewards");
        }
    };

    let mut results = vec![];
    while let Some(reward_res) = cursor.next().await {
        match reward_res {
            Ok(reward) => results.push(reward),
            Err(e) => {
                error!("Error reading rewards cursor: {}", e);
                return HttpResponse::InternalServerError().body("Error reading rewards");
            }
        }
    }
    if auth.role != Role::Admin {
        results.retain(|reward| !is_expired(reward));
    }
    HttpResponse::Ok().json(results)
}

/// PUT /rewards/{reward_id}
pub async fn update_reward(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateRewardRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }
    let reward_id = path.into_inner();

    let errors = validation::validate_reward_update(&payload);
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
    if let Some(reward_type) = &payload.reward_type {
        update_doc.insert("reward_type", reward_type.as_str());
    }
    if let Some(value_type) = &payload.value_type {
        update_doc.insert("value_type", value_type.as_str());
    }
    if let Some(value) = payload.value {
        update_doc.insert("value", value);
    }
    if let Some(points_cost) = payload.points_cost {
        update_doc.insert("points_cost", points_cost);
    }
    if let Some(stock) = payload.stock {
        update_doc.insert("stock", stock);
    }
    if let Some(status) = &payload.status {
        update_doc.insert("status", status.as_str());
    }
    if let Some(expiry_date) = &payload.expiry_date {
        update_doc.insert("expiry_date", expiry_date.to_rfc3339());
    }
    if update_doc.is_empty() {
        return HttpResponse::BadRequest().body("No fields to update");
    }

    let rewards = data.mongodb.db.collection::<Reward>(store::REWARDS);
    match rewards
        .update_one(doc! { "reward_id": &reward_id }, doc! { "$set": update_doc })
        .await
    {
        Ok(res) => {
            if res.matched_count == 0 {
                HttpResponse::NotFound().body("Reward not found")
            } else {
                HttpResponse::Ok().body("Reward updated")
            }
        }
        Err(e) => {
            error!("Error updating reward {}: {}", reward_id, e);
            HttpResponse::InternalServerError().body("Error updating reward")
        }
    }
}

/// DELETE /rewards/{reward_id}
pub async fn delete_reward(
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
    let reward_id = path.into_inner();

    let rewards = data.mongodb.db.collection::<Reward>(store::REWARDS);
    match rewards.delete_one(doc! { "reward_id": &reward_id }).await {
        Ok(res) => {
            if res.deleted_count == 0 {
                HttpResponse::NotFound().body("Reward not found or already deleted")
            } else {
                HttpResponse::Ok().body("Reward deleted")
            }
        }
        Err(e) => {
            error!("Error deleting reward {}: {}", reward_id, e);
            HttpResponse::InternalServerError().body("Error deleting reward")
        }
    }
}

/// POST /rewards/{reward_id}/redeem: points for a coupon. The debit
/// and the stock take are guarded ledger writes; whichever step fails,
/// the earlier ones are compensated so a failed redemption costs the
/// user nothing.
pub async fn redeem_reward(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let reward_id = path.into_inner();
    let db = &data.mongodb.db;

    let rewards = db.collection::<Reward>(store::REWARDS);
    let reward = match rewards.find_one(doc! { "reward_id": &reward_id }).await {
        Ok(Some(reward)) => reward,
        Ok(None) => return HttpResponse::NotFound().body("Reward not found"),
        Err(e) => {
            error!("Error fetching reward {}: {}", reward_id, e);
            return HttpResponse::InternalServerError().body("Error redeeming reward");
        }
    };
    if reward.status != RewardStatus::Active {
        return HttpResponse::Conflict().body("Reward is not available");
    }
    if is_expired(&reward) {
        return HttpResponse::Conflict().body("Reward has expired");
    }

    match ledger::debit(db, &auth.user_id, reward.points_cost).await {
        Ok(()) => {}
        Err(LedgerError::InsufficientPoints) => {
            return HttpResponse::Conflict().body("Insufficient points")
        }
        Err(LedgerError::UnknownUser) => {
            return HttpResponse::Unauthorized().body("Unknown user")
        }
        Err(e) => {
            error!("Error debiting {} for reward {}: {}", auth.user_id, reward_id, e);
            return HttpResponse::InternalServerError().body("Error redeeming reward");
        }
    }

    if let Err(e) = ledger::take_stock_unit(db, &reward_id).await {
        if let Err(refund_err) = ledger::credit(db, &auth.user_id, reward.points_cost).await {
            error!(
                "Failed to refund {} points to {} after stock take failed: {}",
                reward.points_cost, auth.user_id, refund_err
            );
        }
        return match e {
            LedgerError::OutOfStock => HttpResponse::Conflict().body("Reward is out of stock"),
            LedgerError::UnknownReward => HttpResponse::NotFound().body("Reward not found"),
            other => {
                error!("Error taking stock of reward {}: {}", reward_id, other);
                HttpResponse::InternalServerError().body("Error redeeming reward")
            }
        };
    }

    let redemption = RewardRedemption {
        redemption_id: Uuid::new_v4().to_string(),
        reward_id: reward_id.clone(),
        user_id: auth.user_id.clone(),
        coupon_code: ledger::coupon_code(),
        points_spent: reward.points_cost,
        status: RedemptionStatus::Pending,
        redeemed_at: Utc::now(),
    };

    let redemptions = db.collection::<RewardRedemption>(store::REDEMPTIONS);
    match redemptions.insert_one(&redemption).await {
        Ok(_) => {
            info!(
                "Reward {} redeemed by {} for {} points",
                reward_id, auth.user_id, reward.points_cost
            );
            HttpResponse::Ok().json(&redemption)
        }
        Err(e) => {
            error!("Error recording redemption of {}: {}", reward_id, e);
            if let Err(refund_err) = ledger::credit(db, &auth.user_id, reward.points_cost).await {
                error!(
                    "Failed to refund {} points to {}: {}",
                    reward.points_cost, auth.user_id, refund_err
                );
            }
            if let Err(restock_err) = ledger::release_stock_unit(db, &reward_id).await {
                error!("Failed to restock reward {}: {}", reward_id, restock_err);
            }
            HttpResponse::InternalServerError().body("Error recording redemption")
        }
    }
}

/// GET /rewards/redemptions/mine
pub async fn my_redemptions(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let redemptions = data
        .mongodb
        .db
        .collection::<RewardRedemption>(store::REDEMPTIONS);
    let mut cursor = match redemptions.find(doc! { "user_id": &auth.user_id }).await {
        Ok(cur) => cur,
        Err(e) => {
            error!("Error fetching redemptions for {}: {}", auth.user_id, e);
            return HttpResponse::InternalServerError().body("Error fetching redemptions");
        }
    };

    let mut results = vec![];
    while let Some(redemption_res) = cursor.next().await {
        match redemption_res {
            Ok(redemption) => results.push(redemption),
            Err(e) => {
                error!("Error reading redemptions cursor: {}", e);
                return HttpResponse::InternalServerError().body("Error reading redemptions");
            }
        }
    }
    HttpResponse::Ok().json(results)
}

/// GET /rewards/redemptions
pub async fn list_redemptions(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }

    let redemptions = data
        .mongodb
        .db
        .collection::<RewardRedemption>(store::REDEMPTIONS);
    let mut cursor = match redemptions.find(doc! {}).await {
        Ok(cur) => cur,
        Err(e) => {
            error!("Error fetching redemptions: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching redemptions");
        }
    };

    let mut results = vec![];
    while let Some(redemption_res) = cursor.next().await {
        match redemption_res {
            Ok(redemption) => results.push(redemption),
            Err(e) => {
                error!("Error reading redemptions cursor: {}", e);
                return HttpResponse::InternalServerError().body("Error reading redemptions");
            }
        }
    }
    HttpResponse::Ok().json(results)
}

/// PUT /rewards/redemptions/{id}/status: coupon lifecycle after the
/// redemption itself: approve, mark used, expire.
pub async fn update_redemption_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateRedemptionStatusRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }
    let redemption_id = path.into_inner();

    let redemptions = data
        .mongodb
        .db
        .collection::<RewardRedemption>(store::REDEMPTIONS);
    match redemptions
        .update_one(
            doc! { "redemption_id": &redemption_id },
            doc! { "$set": { "status": payload.status.as_str() } },
        )
        .await
    {
        Ok(res) => {
            if res.matched_count == 0 {
                HttpResponse::NotFound().body("Redemption not found")
            } else {
                HttpResponse::Ok().body("Redemption updated")
            }
        }
        Err(e) => {
            error!("Error updating redemption {}: {}", redemption_id, e);
            HttpResponse::InternalServerError().body("Error updating redemption")
        }
    }
}
