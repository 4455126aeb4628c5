use std::env;

#[derive(Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub frontend_origin: String,
    pub bind_address: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            mongo_uri: env::var("MONGO_URI").expect("MONGO_URI must be set"),
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "ecopoints_db".to_string()),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            frontend_origin: env::var("FRONTEND_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        }
    }
}
