// src/main.rs

mod app_state;
mod auth;
mod challenge;
mod config;
mod leaderboard;
mod ledger;
mod quiz;
mod report;
mod reward;
mod store;
mod user_management;
mod validation;

use std::env;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer,
};
use env_logger::Env;
use futures_util::future::{ok, Ready};
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::auth::{login, signup, AuthUser, Claims};
use crate::challenge::{
    approve_participation, create_challenge, delete_challenge, get_challenge, list_challenges,
    list_participations, my_participations, participate, reject_participation, update_challenge,
};
use crate::app_state::AppState;
use crate::leaderboard::{get_current_leaderboard, get_leaderboard_week, rebuild_leaderboard};
use crate::quiz::{
    create_quiz, delete_quiz, get_quiz, list_quizzes, list_submissions, submit_quiz, update_quiz,
};
use crate::report::{
    create_report, delete_report, get_report, list_my_reports, list_reports, update_report,
    update_report_status,
};
use crate::reward::{
    create_reward, delete_reward, list_redemptions, list_rewards, my_redemptions, redeem_reward,
    update_redemption_status, update_reward,
};
use crate::user_management::{
    create_user, delete_user, find_user_email, get_me, get_user_by_id, list_users, update_user,
};

#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Extract "Bearer <token>" from the Authorization header if present
        if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if auth_str.starts_with("Bearer ") {
                    let token = auth_str.trim_start_matches("Bearer ").trim().to_string();
                    match verify_token(&token) {
                        Ok(auth_user) => {
                            req.extensions_mut().insert(auth_user);
                        }
                        Err(e) => {
                            let (req_parts, _payload) = req.into_parts();
                            let resp = HttpResponse::Unauthorized()
                                .body(format!("Invalid token: {}", e))
                                .map_into_boxed_body();
                            let srv_resp = ServiceResponse::new(req_parts, resp);
                            return Box::pin(async move { Ok(srv_resp) });
                        }
                    }
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

fn verify_token(token: &str) -> Result<AuthUser, String> {
    let secret = env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string());
    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    ) {
        Ok(token_data) => Ok(AuthUser {
            user_id: token_data.claims.sub,
            role: token_data.claims.role,
        }),
        Err(e) => Err(format!("Token decode error: {}", e)),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let mongodb = Arc::new(store::MongoDB::init(&config.mongo_uri, &config.database_name).await);

    let frontend_origin = config.frontend_origin.clone();
    let bind_address = config.bind_address.clone();

    println!("Server running at http://{}", bind_address);
    println!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication)
            .app_data(web::Data::new(AppState {
                mongodb: mongodb.clone(),
                config: config.clone(),
            }))
            .service(
                web::scope("/auth")
                    .route("/signup", web::post().to(signup))
                    .route("/login", web::post().to(login)),
            )
            // USERS
            .service(
                web::scope("/users")
                    .route("", web::get().to(list_users))
                    .route("", web::post().to(create_user))
                    .route("/me", web::get().to(get_me))
                    .route("/find_user_email", web::get().to(find_user_email))
                    .route("/get/{id}", web::get().to(get_user_by_id))
                    .route("/{id}", web::put().to(update_user))
                    .route("/{id}", web::delete().to(delete_user)),
            )
            // E-WASTE REPORTS
            .service(
                web::scope("/reports")
                    .route("", web::post().to(create_report))
                    .route("", web::get().to(list_reports))
                    .route("/mine", web::get().to(list_my_reports))
                    .route("/{report_id}/status", web::put().to(update_report_status))
                    .route("/{report_id}", web::get().to(get_report))
                    .route("/{report_id}", web::put().to(update_report))
                    .route("/{report_id}", web::delete().to(delete_report)),
            )
            // QUIZZES
            .service(
                web::scope("/quizzes")
                    .route("", web::get().to(list_quizzes))
                    .route("", web::post().to(create_quiz))
                    .route("/{quiz_id}/submit", web::post().to(submit_quiz))
                    .route("/{quiz_id}/submissions", web::get().to(list_submissions))
                    .route("/{quiz_id}", web::get().to(get_quiz))
                    .route("/{quiz_id}", web::put().to(update_quiz))
                    .route("/{quiz_id}", web::delete().to(delete_quiz)),
            )
            // CHALLENGES
            .service(
                web::scope("/challenges")
                    .route("", web::get().to(list_challenges))
                    .route("", web::post().to(create_challenge))
                    .route("/participations", web::get().to(list_participations))
                    .route("/participations/mine", web::get().to(my_participations))
                    .route(
                        "/participations/{id}/approve",
                        web::post().to(approve_participation),
                    )
                    .route(
                        "/participations/{id}/reject",
                        web::post().to(reject_participation),
                    )
                    .route("/{challenge_id}/participate", web::post().to(participate))
                    .route("/{challenge_id}", web::get().to(get_challenge))
                    .route("/{challenge_id}", web::put().to(update_challenge))
                    .route("/{challenge_id}", web::delete().to(delete_challenge)),
            )
            // REWARDS
            .service(
                web::scope("/rewards")
                    .route("", web::get().to(list_rewards))
                    .route("", web::post().to(create_reward))
                    .route("/redemptions", web::get().to(list_redemptions))
                    .route("/redemptions/mine", web::get().to(my_redemptions))
                    .route(
                        "/redemptions/{id}/status",
                        web::put().to(update_redemption_status),
                    )
                    .route("/{reward_id}/redeem", web::post().to(redeem_reward))
                    .route("/{reward_id}", web::put().to(update_reward))
                    .route("/{reward_id}", web::delete().to(delete_reward)),
            )
            // LEADERBOARD
            .service(
                web::scope("/leaderboard")
                    .route("", web::get().to(get_current_leaderboard))
                    .route("/rebuild", web::post().to(rebuild_leaderboard))
                    .route("/{week}", web::get().to(get_leaderboard_week)),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
