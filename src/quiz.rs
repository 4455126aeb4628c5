// src/quiz.rs

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{error, info};
use mongodb::bson::{doc, to_bson};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::ledger;
use crate::store;
use crate::user_management::Role;
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizStatus {
    Draft,
    Active,
    Inactive,
}

impl QuizStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizStatus::Draft => "draft",
            QuizStatus::Active => "active",
            QuizStatus::Inactive => "inactive",
        }
    }
}

/// Shared by quizzes and challenges. Descriptive only, no scoring
/// effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    /// Index into `options`.
    pub correct_answer: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Quiz {
    pub quiz_id: String,
    pub title: String,
    pub description: String,
    pub questions: Vec<Question>,
    /// Maximum points for a perfect submission.
    pub points: i64,
    /// Minutes.
    pub time_limit: i32,
    pub difficulty: Difficulty,
    pub status: QuizStatus,
    pub created_at: DateTime<Utc>,
}

/// What a customer sees: no correct answers.
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PublicQuiz {
    pub quiz_id: String,
    pub title: String,
    pub description: String,
    pub questions: Vec<PublicQuestion>,
    pub points: i64,
    pub time_limit: i32,
    pub difficulty: Difficulty,
    pub status: QuizStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Quiz> for PublicQuiz {
    fn from(q: Quiz) -> Self {
        Self {
            quiz_id: q.quiz_id,
            title: q.title,
            description: q.description,
            questions: q
                .questions
                .into_iter()
                .map(|question| PublicQuestion {
                    question: question.question,
                    options: question.options,
                })
                .collect(),
            points: q.points,
            time_limit: q.time_limit,
            difficulty: q.difficulty,
            status: q.status,
            created_at: q.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuizSubmission {
    pub submission_id: String,
    pub quiz_id: String,
    pub user_id: String,
    pub answers: Vec<Option<i32>>,
    pub correct_count: i64,
    pub score: i64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateQuizRequest {
    pub title: String,
    pub description: String,
    pub questions: Vec<Question>,
    pub points: i64,
    pub time_limit: i32,
    pub difficulty: Difficulty,
    pub status: QuizStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuizRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub questions: Option<Vec<Question>>,
    pub points: Option<i64>,
    pub time_limit: Option<i32>,
    pub difficulty: Option<Difficulty>,
    pub status: Option<QuizStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuizRequest {
    /// One slot per question; `null` marks an unanswered question.
    pub answers: Vec<Option<i32>>,
}

/// POST /quizzes
pub async fn create_quiz(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateQuizRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }

    let errors = validation::validate_quiz(&payload);
    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "errors": errors }));
    }

    let new_quiz = Quiz {
        quiz_id: Uuid::new_v4().to_string(),
        title: payload.title.clone(),
        description: payload.description.clone(),
        questions: payload.questions.clone(),
        points: payload.points,
        time_limit: payload.time_limit,
        difficulty: payload.difficulty,
        status: payload.status,
        created_at: Utc::now(),
    };

    let quizzes = data.mongodb.db.collection::<Quiz>(store::QUIZZES);
    match quizzes.insert_one(&new_quiz).await {
        Ok(_) => {
            info!("Quiz created: {}", new_quiz.quiz_id);
            HttpResponse::Ok().json(&new_quiz)
        }
        Err(e) => {
            error!("Error inserting quiz: {}", e);
            HttpResponse::InternalServerError().body("Error creating quiz")
        }
    }
}

/// GET /quizzes: admins see everything, customers only active quizzes
/// with the answer key stripped.
pub async fn list_quizzes(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let filter = if auth.role == Role::Admin {
        doc! {}
    } else {
        doc! { "status": "active" }
    };

    let quizzes = data.mongodb.db.collection::<Quiz>(store::QUIZZES);
    let mut cursor = match quizzes.find(filter).await {
        Ok(cur) => cur,
        Err(e) => {
            error!("Error fetching quizzes: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching quizzes");
        }
    };

    let mut results = vec![];
    while let Some(quiz_res) = cursor.next().await {
        match quiz_res {
            Ok(quiz) => results.push(quiz),
            Err(e) => {
                error!("Error reading quizzes cursor: {}", e);
                return HttpResponse::InternalServerError().body("Error reading quizzes");
            }
        }
    }

    if auth.role == Role::Admin {
        HttpResponse::Ok().json(results)
    } else {
        let public: Vec<PublicQuiz> = results.into_iter().map(PublicQuiz::from).collect();
        HttpResponse::Ok().json(public)
    }
}

/// GET /quizzes/{quiz_id}
pub async fn get_quiz(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let quiz_id = path.into_inner();

    let quizzes = data.mongodb.db.collection::<Quiz>(store::QUIZZES);
    match quizzes.find_one(doc! { "quiz_id": &quiz_id }).await {
        Ok(Some(quiz)) => {
            if auth.role == Role::Admin {
                return HttpResponse::Ok().json(quiz);
            }
            if quiz.status != QuizStatus::Active {
                return HttpResponse::NotFound().body("Quiz not found");
            }
            HttpResponse::Ok().json(PublicQuiz::from(quiz))
        }
        Ok(None) => HttpResponse::NotFound().body("Quiz not found"),
        Err(e) => {
            error!("Error fetching quiz {}: {}", quiz_id, e);
            HttpResponse::InternalServerError().body("Error fetching quiz")
        }
    }
}

/// PUT /quizzes/{quiz_id}
pub async fn update_quiz(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateQuizRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if auth.role != Role::Admin {
        return HttpResponse::Unauthorized().body("Admin access required");
    }
    let quiz_id = path.into_inner();

    let errors = validation::validate_quiz_update(&payload);
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
    if let Some(questions) = &payload.questions {
        match to_bson(questions) {
            Ok(bson) => {
                update_doc.insert("questions", bson);
            }
            Err(e) => {
                error!("Error encoding questions: {}", e);
                return HttpResponse::InternalServerError().body("Error updating quiz");
            }
        }
    }
    if let Some(points) = payload.points {
        update_doc.insert("points", points);
    }
    if let Some(time_limit) = payload.time_limit {
        update_doc.insert("time_limit", time_limit);
    }
    if let Some(difficulty) = &payload.difficulty {
        update_doc.insert("difficulty", difficulty.as_str());
    }
    if let Some(status) = &payload.status {
        update_doc.insert("status", status.as_str());
    }
    if update_doc.is_empty() {
        return HttpResponse::BadRequest().body("No fields to update");
    }

    let quizzes = data.mongodb.db.collection::<Quiz>(store::QUIZZES);
    match quizzes
        .update_one(doc! { "quiz_id": &quiz_id }, doc! { "$set": update_doc })
        .await
    {
        Ok(res) => {
            if res.matched_count == 0 {
                HttpResponse::NotFound().body("Quiz not found")
            } else {
                HttpResponse::Ok().body("Quiz updated")
            }
        }
        Err(e) => {
            error!("Error updating quiz {}: {}", quiz_id, e);
            HttpResponse::InternalServerError().body("Error updating quiz")
        }
    }
}

/// DELETE /quizzes/{quiz_id}
pub async fn delete_quiz(
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
    let quiz_id = path.into_inner();

    let quizzes = data.mongodb.db.collection::<Quiz>(store::QUIZZES);
    match quizzes.delete_one(doc! { "quiz_id": &quiz_id }).await {
        Ok(res) => {
            if res.deleted_count == 0 {
                HttpResponse::NotFound().body("Quiz not found or already deleted")
            } else {
                HttpResponse::Ok().body("Quiz deleted")
            }
        }
        Err(e) => {
            error!("Error deleting quiz {}: {}", quiz_id, e);
            HttpResponse::InternalServerError().body("Error deleting quiz")
        }
    }
}

/// POST /quizzes/{quiz_id}/submit: scores the answers and credits the
/// result. The submission record doubles as the idempotency key: it is
/// created with an upsert on (quiz, user), and only the request that
/// actually inserted it credits any points.
pub async fn submit_quiz(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<SubmitQuizRequest>,
) -> impl Responder {
    let auth = match current_user(&req) {
        Some(a) => a,
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    let quiz_id = path.into_inner();

    let quizzes = data.mongodb.db.collection::<Quiz>(store::QUIZZES);
    let quiz = match quizzes.find_one(doc! { "quiz_id": &quiz_id }).await {
        Ok(Some(quiz)) => quiz,
        Ok(None) => return HttpResponse::NotFound().body("Quiz not found"),
        Err(e) => {
            error!("Error fetching quiz {}: {}", quiz_id, e);
            return HttpResponse::InternalServerError().body("Error submitting quiz");
        }
    };
    if quiz.status != QuizStatus::Active {
        return HttpResponse::Conflict().body("Quiz is not open for submissions");
    }

    let errors = validation::validate_submission(&payload.answers, &quiz.questions);
    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "errors": errors }));
    }

    let correct_count = quiz
        .questions
        .iter()
        .zip(payload.answers.iter())
        .filter(|(question, answer)| matches!(answer, Some(idx) if *idx == question.correct_answer))
        .count();
    let score = ledger::quiz_score(correct_count, quiz.questions.len(), quiz.points);

    let answers_bson = match to_bson(&payload.answers) {
        Ok(bson) => bson,
        Err(e) => {
            error!("Error encoding answers: {}", e);
            return HttpResponse::InternalServerError().body("Error submitting quiz");
        }
    };

    let submissions = data
        .mongodb
        .db
        .collection::<QuizSubmission>(store::QUIZ_SUBMISSIONS);
    let result = submissions
        .update_one(
            doc! { "quiz_id": &quiz_id, "user_id": &auth.user_id },
            doc! { "$setOnInsert": {
                "submission_id": Uuid::new_v4().to_string(),
                "quiz_id": &quiz_id,
                "user_id": &auth.user_id,
                "answers": answers_bson,
                "correct_count": correct_count as i64,
                "score": score,
                "submitted_at": Utc::now().to_rfc3339(),
            } },
        )
        .upsert(true)
        .await;

    match result {
        Ok(res) if res.upserted_id.is_some() => {
            if let Err(e) = ledger::credit(&data.mongodb.db, &auth.user_id, score).await {
                error!(
                    "Submission for quiz {} recorded but crediting {} points to {} failed: {}",
                    quiz_id, score, auth.user_id, e
                );
                return HttpResponse::InternalServerError()
                    .body("Submission recorded but points could not be credited");
            }
            info!(
                "Quiz {} submitted by {}: {}/{} correct, {} points",
                quiz_id,
                auth.user_id,
                correct_count,
                quiz.questions.len(),
                score
            );
            HttpResponse::Ok().json(serde_json::json!({
                "quiz_id": quiz_id,
                "correct_count": correct_count,
                "total_questions": quiz.questions.len(),
                "score": score,
                "points_awarded": score,
            }))
        }
        Ok(_) => HttpResponse::Conflict().body("Quiz already submitted"),
        Err(e) => {
            error!("Error recording submission for quiz {}: {}", quiz_id, e);
            HttpResponse::InternalServerError().body("Error submitting quiz")
        }
    }
}

/// GET /quizzes/{quiz_id}/submissions
pub async fn list_submissions(
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
    let quiz_id = path.into_inner();

    let submissions = data
        .mongodb
        .db
        .collection::<QuizSubmission>(store::QUIZ_SUBMISSIONS);
    let mut cursor = match submissions.find(doc! { "quiz_id": &quiz_id }).await {
        Ok(cur) => cur,
        Err(e) => {
            error!("Error fetching submissions for quiz {}: {}", quiz_id, e);
            return HttpResponse::InternalServerError().body("Error fetching submissions");
        }
    };

    let mut results = vec![];
    while let Some(submission_res) = cursor.next().await {
        match submission_res {
            Ok(submission) => results.push(submission),
            Err(e) => {
                error!("Error reading submissions cursor: {}", e);
                return HttpResponse::InternalServerError().body("Error reading submissions");
            }
        }
    }
    HttpResponse::Ok().json(results)
}
