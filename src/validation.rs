// src/validation.rs
//
// Field-level checks shared by the create/update handlers. Everything
// here is a pure function over the request payload; enum membership is
// already settled at the JSON boundary, these cover the text and
// numeric rules.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::challenge::{CreateChallengeRequest, UpdateChallengeRequest};
use crate::quiz::{CreateQuizRequest, Question, UpdateQuizRequest};
use crate::reward::{CreateRewardRequest, UpdateRewardRequest};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

fn field_error(field: &str, message: &str) -> FieldError {
    FieldError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn validate_signup(email: &str, display_name: &str, password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if !is_valid_email(email) {
        errors.push(field_error("email", "A valid email address is required"));
    }
    if display_name.trim().is_empty() {
        errors.push(field_error("display_name", "Display name is required"));
    }
    if password.len() < 8 {
        errors.push(field_error("password", "Password must be at least 8 characters"));
    }
    errors
}

pub fn validate_user(email: &str, points: i64) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if !is_valid_email(email) {
        errors.push(field_error("email", "A valid email address is required"));
    }
    if points < 0 {
        errors.push(field_error("points", "Points must not be negative"));
    }
    errors
}

pub fn validate_question(index: usize, question: &Question) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let field = |name: &str| format!("questions[{}].{}", index, name);

    if question.question.trim().is_empty() {
        errors.push(FieldError {
            field: field("question"),
            message: "Question text is required".to_string(),
        });
    }
    if question.options.len() < 2 {
        errors.push(FieldError {
            field: field("options"),
            message: "At least two options are required".to_string(),
        });
    }
    if question.options.iter().any(|option| option.trim().is_empty()) {
        errors.push(FieldError {
            field: field("options"),
            message: "Options must not be empty".to_string(),
        });
    }
    if question.correct_answer < 0 || question.correct_answer as usize >= question.options.len() {
        errors.push(FieldError {
            field: field("correct_answer"),
            message: "Correct answer must reference one of the options".to_string(),
        });
    }
    errors
}

pub fn validate_quiz(req: &CreateQuizRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if req.title.trim().is_empty() {
        errors.push(field_error("title", "Title is required"));
    }
    if req.description.trim().is_empty() {
        errors.push(field_error("description", "Description is required"));
    }
    if req.questions.is_empty() {
        errors.push(field_error("questions", "A quiz needs at least one question"));
    }
    if req.time_limit <= 0 {
        errors.push(field_error("time_limit", "Time limit must be positive"));
    }
    if req.points < 0 {
        errors.push(field_error("points", "Points must not be negative"));
    }
    for (index, question) in req.questions.iter().enumerate() {
        errors.extend(validate_question(index, question));
    }
    errors
}

pub fn validate_quiz_update(req: &UpdateQuizRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(title) = &req.title {
        if title.trim().is_empty() {
            errors.push(field_error("title", "Title is required"));
        }
    }
    if let Some(description) = &req.description {
        if description.trim().is_empty() {
            errors.push(field_error("description", "Description is required"));
        }
    }
    if let Some(questions) = &req.questions {
        if questions.is_empty() {
            errors.push(field_error("questions", "A quiz needs at least one question"));
        }
        for (index, question) in questions.iter().enumerate() {
            errors.extend(validate_question(index, question));
        }
    }
    if let Some(time_limit) = req.time_limit {
        if time_limit <= 0 {
            errors.push(field_error("time_limit", "Time limit must be positive"));
        }
    }
    if let Some(points) = req.points {
        if points < 0 {
            errors.push(field_error("points", "Points must not be negative"));
        }
    }
    errors
}

pub fn validate_challenge(req: &CreateChallengeRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if req.title.trim().is_empty() {
        errors.push(field_error("title", "Title is required"));
    }
    if req.description.trim().is_empty() {
        errors.push(field_error("description", "Description is required"));
    }
    if req.requirements.is_empty() || req.requirements.iter().all(|r| r.trim().is_empty()) {
        errors.push(field_error("requirements", "At least one requirement is required"));
    }
    if req.estimated_time <= 0 {
        errors.push(field_error("estimated_time", "Estimated time must be positive"));
    }
    if req.points < 0 {
        errors.push(field_error("points", "Points must not be negative"));
    }
    errors
}

pub fn validate_challenge_update(req: &UpdateChallengeRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(title) = &req.title {
        if title.trim().is_empty() {
            errors.push(field_error("title", "Title is required"));
        }
    }
    if let Some(description) = &req.description {
        if description.trim().is_empty() {
            errors.push(field_error("description", "Description is required"));
        }
    }
    if let Some(requirements) = &req.requirements {
        if requirements.is_empty() || requirements.iter().all(|r| r.trim().is_empty()) {
            errors.push(field_error("requirements", "At least one requirement is required"));
        }
    }
    if let Some(estimated_time) = req.estimated_time {
        if estimated_time <= 0 {
            errors.push(field_error("estimated_time", "Estimated time must be positive"));
        }
    }
    if let Some(points) = req.points {
        if points < 0 {
            errors.push(field_error("points", "Points must not be negative"));
        }
    }
    errors
}

pub fn validate_reward(req: &CreateRewardRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if req.title.trim().is_empty() {
        errors.push(field_error("title", "Title is required"));
    }
    if req.description.trim().is_empty() {
        errors.push(field_error("description", "Description is required"));
    }
    if req.value <= 0.0 {
        errors.push(field_error("value", "Value must be positive"));
    }
    if req.points_cost < 0 {
        errors.push(field_error("points_cost", "Points cost must not be negative"));
    }
    if req.stock < 0 {
        errors.push(field_error("stock", "Stock must not be negative"));
    }
    if let Some(expiry_date) = req.expiry_date {
        if expiry_date <= Utc::now() {
            errors.push(field_error("expiry_date", "Expiry date must be in the future"));
        }
    }
    errors
}

pub fn validate_reward_update(req: &UpdateRewardRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(title) = &req.title {
        if title.trim().is_empty() {
            errors.push(field_error("title", "Title is required"));
        }
    }
    if let Some(description) = &req.description {
        if description.trim().is_empty() {
            errors.push(field_error("description", "Description is required"));
        }
    }
    if let Some(value) = req.value {
        if value <= 0.0 {
            errors.push(field_error("value", "Value must be positive"));
        }
    }
    if let Some(points_cost) = req.points_cost {
        if points_cost < 0 {
            errors.push(field_error("points_cost", "Points cost must not be negative"));
        }
    }
    if let Some(stock) = req.stock {
        if stock < 0 {
            errors.push(field_error("stock", "Stock must not be negative"));
        }
    }
    if let Some(expiry_date) = req.expiry_date {
        if expiry_date <= Utc::now() {
            errors.push(field_error("expiry_date", "Expiry date must be in the future"));
        }
    }
    errors
}

/// One answer slot per question, and every answered index must point at
/// an option that exists.
pub fn validate_submission(answers: &[Option<i32>], questions: &[Question]) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if answers.len() != questions.len() {
        errors.push(field_error("answers", "One answer slot per question is required"));
        return errors;
    }
    for (index, (answer, question)) in answers.iter().zip(questions).enumerate() {
        if let Some(selected) = answer {
            if *selected < 0 || *selected as usize >= question.options.len() {
                errors.push(FieldError {
                    field: format!("answers[{}]", index),
                    message: "Selected option does not exist".to_string(),
                });
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::{Difficulty, QuizStatus};
    use crate::reward::{RewardStatus, RewardType, ValueType};
    use chrono::Duration;

    fn question(correct_answer: i32) -> Question {
        Question {
            question: "Which bin does a phone battery go in?".to_string(),
            options: vec!["General waste".to_string(), "Battery recycling".to_string()],
            correct_answer,
        }
    }

    fn quiz_request(questions: Vec<Question>) -> CreateQuizRequest {
        CreateQuizRequest {
            title: "Battery basics".to_string(),
            description: "Sorting batteries correctly".to_string(),
            questions,
            points: 100,
            time_limit: 10,
            difficulty: Difficulty::Easy,
            status: QuizStatus::Active,
        }
    }

    fn reward_request() -> CreateRewardRequest {
        CreateRewardRequest {
            title: "10% off".to_string(),
            description: "Discount at the repair cafe".to_string(),
            reward_type: RewardType::Discount,
            value_type: ValueType::Percentage,
            value: 10.0,
            points_cost: 300,
            stock: 5,
            status: RewardStatus::Active,
            expiry_date: None,
        }
    }

    #[test]
    fn well_formed_quiz_passes() {
        assert!(validate_quiz(&quiz_request(vec![question(1)])).is_empty());
    }

    #[test]
    fn quiz_without_questions_is_rejected() {
        let errors = validate_quiz(&quiz_request(vec![]));
        assert!(errors.iter().any(|e| e.field == "questions"));
    }

    #[test]
    fn quiz_with_bad_time_limit_is_rejected() {
        let mut req = quiz_request(vec![question(0)]);
        req.time_limit = 0;
        let errors = validate_quiz(&req);
        assert!(errors.iter().any(|e| e.field == "time_limit"));
    }

    #[test]
    fn question_with_out_of_range_answer_is_rejected() {
        let errors = validate_question(0, &question(2));
        assert!(errors.iter().any(|e| e.field == "questions[0].correct_answer"));
    }

    #[test]
    fn question_needs_two_options() {
        let q = Question {
            question: "Only one way?".to_string(),
            options: vec!["Yes".to_string()],
            correct_answer: 0,
        };
        let errors = validate_question(0, &q);
        assert!(errors.iter().any(|e| e.field == "questions[0].options"));
    }

    #[test]
    fn malformed_email_is_rejected() {
        let errors = validate_user("not-an-email", 0);
        assert!(errors.iter().any(|e| e.field == "email"));
        assert!(validate_user("user@example.com", 0).is_empty());
    }

    #[test]
    fn negative_points_are_rejected() {
        let errors = validate_user("user@example.com", -1);
        assert!(errors.iter().any(|e| e.field == "points"));
    }

    #[test]
    fn reward_with_past_expiry_is_rejected() {
        let mut req = reward_request();
        req.expiry_date = Some(Utc::now() - Duration::days(1));
        let errors = validate_reward(&req);
        assert!(errors.iter().any(|e| e.field == "expiry_date"));
    }

    #[test]
    fn reward_with_future_expiry_passes() {
        let mut req = reward_request();
        req.expiry_date = Some(Utc::now() + Duration::days(30));
        assert!(validate_reward(&req).is_empty());
    }

    #[test]
    fn reward_value_must_be_positive() {
        let mut req = reward_request();
        req.value = 0.0;
        let errors = validate_reward(&req);
        assert!(errors.iter().any(|e| e.field == "value"));
    }

    #[test]
    fn submission_must_answer_every_slot() {
        let questions = vec![question(0), question(1)];
        let errors = validate_submission(&[Some(0)], &questions);
        assert!(errors.iter().any(|e| e.field == "answers"));
        assert!(validate_submission(&[Some(0), None], &questions).is_empty());
    }

    #[test]
    fn submission_indices_must_exist() {
        let questions = vec![question(0)];
        let errors = validate_submission(&[Some(5)], &questions);
        assert!(errors.iter().any(|e| e.field == "answers[0]"));
    }
}
