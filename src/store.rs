use log::info;
use mongodb::{options::ClientOptions, Client, Database};

// Collection names, shared so ledger guards and handlers always hit the
// same documents.
pub const USERS: &str = "users";
pub const REPORTS: &str = "ewaste_reports";
pub const QUIZZES: &str = "quizzes";
pub const QUIZ_SUBMISSIONS: &str = "quiz_submissions";
pub const CHALLENGES: &str = "challenges";
pub const PARTICIPATIONS: &str = "challenge_participations";
pub const REWARDS: &str = "rewards";
pub const REDEMPTIONS: &str = "reward_redemptions";
pub const LEADERBOARD: &str = "leaderboard";

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Self {
        let client_options = ClientOptions::parse(uri)
            .await
            .expect("Failed to parse MongoDB connection string");
        let client = Client::with_options(client_options).expect("Failed to initialize client");
        let db = client.database(db_name);
        info!("Connected to MongoDB database '{}'", db_name);
        MongoDB { client, db }
    }
}
