// src/leaderboard.rs
//
// Weekly ranking projection. Entries are denormalized and read-only;
// the rebuild endpoint recomputes the current week from the live user
// balances and processed reports.

use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{Datelike, Utc};
use futures_util::{StreamExt, TryStreamExt};
use log::{error, info};
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::store;
use crate::user_management::{Role, User};

/// Cash prizes for the top three places, in rank order.
const CASH_PRIZES: [f64; 3] = [100.0, 50.0, 25.0];

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// ISO week, e.g. `2026-W32`.
    pub week: String,
    pub user_id: String,
    pub display_name: String,
    pub points: i64,
    pub devices_recycled: i64,
    pub rank: i32,
    pub cash_prize: Option<f64>,
}

pub fn current_week() -> String {
    let week = Utc::now().iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

async fn fetch_week(data: &web::Data<AppState>, week: &str) -> Result<Vec<LeaderboardEntry>, HttpResponse> {
    let entries = data
        .mongodb
        .db
        .collection::<LeaderboardEntry>(store::LEADERBOARD);
    let mut cursor = match entries.find(doc! { "week": week }).sort(doc! { "rank": 1 }).await {
        Ok(cur) => cur,
        Err(e) => {
            error!("Error fetching leaderboard for {}: {}", week, e);
            return Err(HttpResponse::InternalServerError().body("Error fetching leaderboard"));
        }
    };

    let mut results = vec![];
    while let Some(entry_res) = cursor.next().await {
        match entry_res {
            Ok(entry) => results.push(entry),
            Err(e) => {
                error!("Error reading leaderboard cursor: {}", e);
                return Err(HttpResponse::InternalServerError().body("Error reading leaderboard"));
            }
        }
    }
    Ok(results)
}

/// GET /leaderboard
pub async fn get_current_leaderboard(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    if current_user(&req).is_none() {
        return HttpResponse::Unauthorized().body("Unauthorized");
    }
    match fetch_week(&data, &current_week()).await {
        Ok(entries) => HttpResponse::Ok().json(entries),
        Err(resp) => resp,
    }
}

/// GET /leaderboard/{week}
pub async fn get_leaderboard_week(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    if current_user(&req).is_none() {
        return HttpResponse::Unauthorized().body("Unauthorized");
    }
    match fetch_week(&data, &path.into_inner()).await {
        Ok(entries) => HttpResponse::Ok().json(entries),
        Err(resp) => resp,
    }
}

/// POST /leaderboard/rebuild: recompute the current week's ranking
/// from user balances and processed report counts, then replace the
/// stored entries wholesale.
pub async fn rebuild_leaderboard(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }

    let db = &data.mongodb.db;
    let week = current_week();

    let users: Vec<User> = match db
        .collection::<User>(store::USERS)
        .find(doc! { "role": "customer", "status": "active" })
        .sort(doc! { "points": -1 })
        .await
    {
        Ok(cursor) => match cursor.try_collect().await {
            Ok(users) => users,
            Err(e) => {
                error!("Error collecting users for leaderboard: {}", e);
                return HttpResponse::InternalServerError().body("Error rebuilding leaderboard");
            }
        },
        Err(e) => {
            error!("Error fetching users for leaderboard: {}", e);
            return HttpResponse::InternalServerError().body("Error rebuilding leaderboard");
        }
    };

    let processed: Vec<Document> = match db
        .collection::<Document>(store::REPORTS)
        .find(doc! { "status": "processed" })
        .await
    {
        Ok(cursor) => match cursor.try_collect().await {
            Ok(reports) => reports,
            Err(e) => {
                error!("Error collecting reports for leaderboard: {}", e);
                return HttpResponse::InternalServerError().body("Error rebuilding leaderboard");
            }
        },
        Err(e) => {
            error!("Error fetching reports for leaderboard: {}", e);
            return HttpResponse::InternalServerError().body("Error rebuilding leaderboard");
        }
    };

    let mut device_counts: HashMap<String, i64> = HashMap::new();
    for report in &processed {
        if let Ok(user_id) = report.get_str("user_id") {
            *device_counts.entry(user_id.to_string()).or_insert(0) += 1;
        }
    }

    let entries: Vec<LeaderboardEntry> = users
        .into_iter()
        .enumerate()
        .map(|(index, user)| LeaderboardEntry {
            week: week.clone(),
            devices_recycled: device_counts.get(&user.user_id).copied().unwrap_or(0),
            user_id: user.user_id,
            display_name: user.display_name,
            points: user.points,
            rank: index as i32 + 1,
            cash_prize: CASH_PRIZES.get(index).copied(),
        })
        .collect();

    let leaderboard = db.collection::<LeaderboardEntry>(store::LEADERBOARD);
    if let Err(e) = leaderboard.delete_many(doc! { "week": &week }).await {
        error!("Error clearing leaderboard for {}: {}", week, e);
        return HttpResponse::InternalServerError().body("Error rebuilding leaderboard");
    }
    if !entries.is_empty() {
        if let Err(e) = leaderboard.insert_many(&entries).await {
            error!("Error storing leaderboard for {}: {}", week, e);
            return HttpResponse::InternalServerError().body("Error rebuilding leaderboard");
        }
    }

    info!("Leaderboard rebuilt for {}: {} entries", week, entries.len());
    HttpResponse::Ok().json(entries)
}
