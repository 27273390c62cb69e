use ammonia;

use crate::models::quiz::{QuizQuestion, UpsertQuizRequest};

/// Clean HTML content using the ammonia library.
///
/// Whitelist-based: safe tags (like <b>, <p>) survive, <script>/<iframe>
/// and event attributes are stripped. Quiz text is rendered as rich text in
/// the student portal, so everything an administrator authors goes through
/// here before it is stored.
///
/// The output is HTML, not plain text: a bare `<` or `&` comes back as an
/// entity (`3 < 5` is stored as `3 &lt; 5`), so clients must render quiz
/// text as HTML rather than inserting it as text.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Sanitises every authored string of a quiz.
pub fn clean_quiz(mut req: UpsertQuizRequest) -> UpsertQuizRequest {
    req.title = clean_html(&req.title);
    req.subject = clean_html(&req.subject);
    req.questions = req
        .questions
        .into_iter()
        .map(|q| QuizQuestion {
            text: clean_html(&q.text),
            options: q.options.iter().map(|o| clean_html(o)).collect(),
            ..q
        })
        .collect();
    req
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_is_stripped() {
        assert_eq!(clean_html("<b>x</b><script>alert(1)</script>"), "<b>x</b>");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(clean_html("What is 12 x 3?"), "What is 12 x 3?");
    }

    #[test]
    fn test_comparison_stored_as_entity() {
        assert_eq!(clean_html("Is 3 < 5?"), "Is 3 &lt; 5?");
    }
}
