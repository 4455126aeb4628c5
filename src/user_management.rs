// src/user_management.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use bcrypt::{hash, DEFAULT_COST};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{error, info};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::store;
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Customer => "customer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
        }
    }
}

/// A user exactly as it lives in MongoDB. The `points` field is only
/// ever mutated through the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    /// bcrypt hash
    pub password: String,
    pub role: Role,
    pub points: i64,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

/// What we expose to the frontend: the password hash never leaves.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub points: i64,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email,
            display_name: u.display_name,
            role: u.role,
            points: u.points,
            status: u.status,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub role: Role,
    pub points: Option<i64>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Deserialize)]
pub struct FindUserQuery {
    pub query: String,
}

/// GET /users
pub async fn list_users(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }

    let users_collection = data.mongodb.db.collection::<User>(store::USERS);
    let mut cursor = match users_collection.find(doc! {}).await {
        Ok(cursor) => cursor,
        Err(err) => {
            error!("Error fetching users: {}", err);
            return HttpResponse::InternalServerError().body("Error fetching users");
        }
    };

    let mut users: Vec<PublicUser> = Vec::new();
    while let Some(result) = cursor.next().await {
        match result {
            Ok(user) => users.push(PublicUser::from(user)),
            Err(err) => {
                error!("Error iterating users: {}", err);
                return HttpResponse::InternalServerError().body("Error iterating users");
            }
        }
    }

    HttpResponse::Ok().json(users)
}

/// GET /users/me
pub async fn get_me(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let users_collection = data.mongodb.db.collection::<User>(store::USERS);
    match users_collection.find_one(doc! { "user_id": &auth.user_id }).await {
        Ok(Some(user)) => HttpResponse::Ok().json(PublicUser::from(user)),
        Ok(None) => HttpResponse::NotFound().body("User not found"),
        Err(e) => {
            error!("Error fetching user {}: {}", auth.user_id, e);
            HttpResponse::InternalServerError().body("Error fetching user")
        }
    }
}

/// GET /users/get/{id}: a user can fetch themselves, admins anyone.
pub async fn get_user_by_id(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let user_id = path.into_inner();
    if auth.role != Role::Admin && auth.user_id != user_id {
        return HttpResponse::Unauthorized().body("Cannot access other users");
    }

    let users_collection = data.mongodb.db.collection::<User>(store::USERS);
    match users_collection.find_one(doc! { "user_id": &user_id }).await {
        Ok(Some(user)) => HttpResponse::Ok().json(PublicUser::from(user)),
        Ok(None) => HttpResponse::NotFound().body("User not found"),
        Err(e) => {
            error!("Error fetching user {}: {}", user_id, e);
            HttpResponse::InternalServerError().body("Error fetching user")
        }
    }
}

/// GET /users/find_user_email?query=
pub async fn find_user_email(
    req: HttpRequest,
    query: web::Query<FindUserQuery>,
    data: web::Data<AppState>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }

    let users_collection = data.mongodb.db.collection::<User>(store::USERS);
    let filter = doc! { "email": { "$regex": &query.query, "$options": "i" } };

    let mut cursor = match users_collection.find(filter).await {
        Ok(cursor) => cursor,
        Err(err) => {
            error!("Error searching users: {}", err);
            return HttpResponse::InternalServerError().body("Error searching users");
        }
    };

    let mut users: Vec<PublicUser> = Vec::new();
    while let Some(result) = cursor.next().await {
        match result {
            Ok(user) => users.push(PublicUser::from(user)),
            Err(err) => {
                error!("Error iterating users: {}", err);
                return HttpResponse::InternalServerError().body("Error iterating users");
            }
        }
    }

    HttpResponse::Ok().json(users)
}

/// POST /users: admin-created account, any role.
pub async fn create_user(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateUserRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }

    let points = payload.points.unwrap_or(0);
    let errors = validation::validate_user(&payload.email, points);
    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "errors": errors }));
    }

    let users_collection = data.mongodb.db.collection::<User>(store::USERS);
    match users_collection.find_one(doc! { "email": &payload.email }).await {
        Ok(Some(_)) => return HttpResponse::Conflict().body("Email already registered"),
        Ok(None) => {}
        Err(e) => {
            error!("Error checking email: {}", e);
            return HttpResponse::InternalServerError().body("Error creating user");
        }
    }

    let hashed_password = match hash(&payload.password, DEFAULT_COST) {
        Ok(h) => h,
        Err(_) => return HttpResponse::InternalServerError().body("Error hashing password"),
    };

    let new_user = User {
        user_id: Uuid::new_v4().to_string(),
        email: payload.email.clone(),
        display_name: payload.display_name.clone(),
        password: hashed_password,
        role: payload.role,
        points,
        status: payload.status.unwrap_or(UserStatus::Active),
        created_at: Utc::now(),
    };

    match users_collection.insert_one(&new_user).await {
        Ok(_) => {
            info!("User created by admin: {}", new_user.user_id);
            HttpResponse::Ok().json(PublicUser::from(new_user))
        }
        Err(e) => {
            error!("Error inserting user: {}", e);
            HttpResponse::InternalServerError().body("Error creating user")
        }
    }
}

/// PUT /users/{id}: display name, role and account status only. Point
/// balances are off limits here; the ledger owns them.
pub async fn update_user(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateUserRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }
    let user_id = path.into_inner();

    let mut update_doc = doc! {};
    if let Some(display_name) = &payload.display_name {
        update_doc.insert("display_name", display_name);
    }
    if let Some(role) = &payload.role {
        update_doc.insert("role", role.as_str());
    }
    if let Some(status) = &payload.status {
        update_doc.insert("status", status.as_str());
    }
    if update_doc.is_empty() {
        return HttpResponse::BadRequest().body("No fields to update");
    }

    let users_collection = data.mongodb.db.collection::<User>(store::USERS);
    match users_collection
        .update_one(doc! { "user_id": &user_id }, doc! { "$set": update_doc })
        .await
    {
        Ok(res) => {
            if res.matched_count == 0 {
                HttpResponse::NotFound().body("User not found")
            } else {
                HttpResponse::Ok().body("User updated")
            }
        }
        Err(e) => {
            error!("Error updating user {}: {}", user_id, e);
            HttpResponse::InternalServerError().body("Error updating user")
        }
    }
}

/// DELETE /users/{id}
pub async fn delete_user(
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
    let user_id = path.into_inner();

    let users_collection = data.mongodb.db.collection::<User>(store::USERS);
    match users_collection.delete_one(doc! { "user_id": &user_id }).await {
        Ok(res) => {
            if res.deleted_count == 0 {
                HttpResponse::NotFound().body("User not found or already deleted")
            } else {
                info!("User deleted: {}", user_id);
                HttpResponse::Ok().body("User deleted")
            }
        }
        Err(e) => {
            error!("Error deleting user {}: {}", user_id, e);
            HttpResponse::InternalServerError().body("Error deleting user")
        }
    }
}
