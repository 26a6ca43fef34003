//! Keyword rule-sets, all lower-case literal substrings.
//!
//! Short entries such as "pass" or "consider" over-match; they are kept as-is.

use super::Category;

const OUT_OF_OFFICE: &[&str] = &[
    "out of office",
    "on vacation",
    "on holiday",
    "on leave",
    "annual leave",
    "away from the office",
    "not in office",
    "out of town",
    "will return on",
    "away until",
    "auto-reply",
    "automatic reply",
    "vacation response",
    "limited access to email",
    "will not be checking emails",
    "automatic response",
    "vacation notice",
    "absence",
    "unavailable",
    "return to office",
    "back in office",
    "away from my desk",
    "temporarily unavailable",
];

const SPAM: &[&str] = &[
    "viagra",
    "lottery",
    "won millions",
    "nigerian prince",
    "bitcoin investment",
    "get rich",
    "enlarge",
    "pharmacy",
    "cheap meds",
    "weight loss",
    "instant approval",
    "no fee",
    "investment opportunity",
    "cryptocurrency investment",
    "low risk high return",
    "make money fast",
    "work from home",
    "business proposal",
    "urgent business",
    "million dollar",
    "free money",
    "cash prize",
    "congratulations you won",
    "you have won",
    "jackpot",
    "claim your prize",
    "wire transfer",
    "overseas",
    "confidential",
    "bank details",
    "account number",
];

const MEETING_BOOKED: &[&str] = &[
    "meeting confirmed",
    "appointment confirmed",
    "calendar invite",
    "scheduled",
    "meeting booked",
    "confirmed for",
    "appointment set",
    "looking forward to our meeting",
    "meeting details",
    "zoom link",
    "google meet",
    "microsoft teams",
    "webex",
    "has been scheduled",
    "calendar",
    "invitation",
    "accepted your invitation",
    "meeting id",
    "password",
    "agenda",
    "conference call",
    "call details",
    "meeting date",
    "meeting time",
    "scheduled for",
    "appointment for",
    "join meeting",
    "video conference",
    "conference",
    "session",
    "appointment",
    "meeting has been",
    "your meeting",
    "meeting on",
    "date:",
    "time:",
];

const NOT_INTERESTED: &[&str] = &[
    "not interested",
    "no thanks",
    "not at this time",
    "pass",
    "decline",
    "we'll pass",
    "don't contact",
    "remove from list",
    "unsubscribe",
    "not a good fit",
    "no need",
    "don't need",
    "not looking",
    "no longer interested",
    "decided against",
    "going with another",
    "go with another",
    "chosen another",
    "opted for different",
    "pursuing other",
];

const INTERESTED: &[&str] = &[
    "interested",
    "tell me more",
    "would like to know",
    "send more information",
    "sounds good",
    "i'm interested",
    "we are interested",
    "want to learn more",
    "looking forward",
    "would like to discuss",
    "when can we",
    "next steps",
    "tell me about",
    "please share",
    "more details",
    "consider",
    "intrigued by",
];

pub(super) fn patterns_for(category: Category) -> &'static [&'static str] {
    match category {
        Category::OutOfOffice => OUT_OF_OFFICE,
        Category::Spam => SPAM,
        Category::MeetingBooked => MEETING_BOOKED,
        Category::NotInterested => NOT_INTERESTED,
        Category::Interested => INTERESTED,
        Category::Uncategorized => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_are_lower_case() {
        for category in Category::PRIORITY {
            for pattern in patterns_for(category) {
                assert_eq!(*pattern, pattern.to_lowercase(), "{} in {}", pattern, category);
            }
        }
    }

    #[test]
    fn test_uncategorized_has_no_rules() {
        assert!(patterns_for(Category::Uncategorized).is_empty());
    }
}
