use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use log::{error, info};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::store;
use crate::user_management::{PublicUser, Role, User, UserStatus};
use crate::validation;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// Decoded identity of the caller, inserted into request extensions by
/// the `Authentication` middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub role: Role,
}

pub fn current_user(req: &HttpRequest) -> Option<AuthUser> {
    req.extensions().get::<AuthUser>().cloned()
}

#[derive(Deserialize)]
pub struct SignupInfo {
    pub email: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginInfo {
    pub email: String,
    pub password: String,
}

// JWT Creation
pub fn create_jwt(user_id: &str, role: Role, secret: &str) -> String {
    let expiration = Utc::now() + Duration::hours(24);
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: expiration.timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref())).unwrap()
}

// Signup Endpoint
pub async fn signup(
    data: web::Data<AppState>,
    signup_info: web::Json<SignupInfo>,
) -> impl Responder {
    let errors = validation::validate_signup(
        &signup_info.email,
        &signup_info.display_name,
        &signup_info.password,
    );
    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "errors": errors }));
    }

    let users_collection = data.mongodb.db.collection::<User>(store::USERS);
    match users_collection.find_one(doc! { "email": &signup_info.email }).await {
        Ok(Some(_)) => return HttpResponse::Conflict().body("Email already registered"),
        Ok(None) => {}
        Err(e) => {
            error!("Error checking email during signup: {}", e);
            return HttpResponse::InternalServerError().body("Error signing up");
        }
    }

    let hashed_password = match hash(&signup_info.password, DEFAULT_COST) {
        Ok(h) => h,
        Err(_) => return HttpResponse::InternalServerError().body("Error hashing password"),
    };

    let new_user = User {
        user_id: Uuid::new_v4().to_string(),
        email: signup_info.email.clone(),
        display_name: signup_info.display_name.clone(),
        password: hashed_password,
        role: Role::Customer,
        points: 0,
        status: UserStatus::Active,
        created_at: Utc::now(),
    };

    match users_collection.insert_one(&new_user).await {
        Ok(_) => {
            info!("New signup: {}", new_user.user_id);
            let token = create_jwt(&new_user.user_id, new_user.role, &data.config.jwt_secret);
            HttpResponse::Ok().json(serde_json::json!({
                "token": token,
                "user": PublicUser::from(new_user),
            }))
        }
        Err(e) => {
            error!("Error inserting user: {:?}", e);
            HttpResponse::InternalServerError().body("Error signing up")
        }
    }
}

// Login Endpoint
pub async fn login(
    data: web::Data<AppState>,
    login_info: web::Json<LoginInfo>,
) -> impl Responder {
    let users_collection = data.mongodb.db.collection::<User>(store::USERS);
    let user_doc = users_collection
        .find_one(doc! { "email": &login_info.email })
        .await;

    match user_doc {
        Ok(Some(user)) => {
            if !verify(&login_info.password, &user.password).unwrap_or(false) {
                return HttpResponse::Unauthorized().body("Invalid credentials");
            }
            if user.status == UserStatus::Suspended {
                return HttpResponse::Unauthorized().body("Account suspended");
            }
            let token = create_jwt(&user.user_id, user.role, &data.config.jwt_secret);
            HttpResponse::Ok().json(serde_json::json!({
                "token": token,
                "user": PublicUser::from(user),
            }))
        }
        Ok(None) => HttpResponse::Unauthorized().body("Invalid credentials"),
        Err(_) => HttpResponse::InternalServerError().body("Error logging in"),
    }
}
