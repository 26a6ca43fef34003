//! Canned replies used when no model is configured or the model call fails

use crate::classify::Category;

/// First name to address the sender by.
///
/// `"Jane Doe <jane@example.com>"` gives `Jane`, a bare `"jane@example.com"`
/// gives `Jane`, anything else gives `there`.
pub fn extract_first_name(from: Option<&str>) -> String {
    let Some(from) = from.map(str::trim).filter(|s| !s.is_empty()) else {
        return "there".to_string();
    };

    if let Some((name, _)) = from.split_once('<') {
        let name = name.trim().trim_matches('"');
        return match name.split_whitespace().next() {
            Some(first) => first.to_string(),
            None => "there".to_string(),
        };
    }

    if let Some((local, _)) = from.split_once('@') {
        let mut chars = local.chars();
        if let Some(first) = chars.next() {
            return first.to_uppercase().chain(chars).collect();
        }
    }

    "there".to_string()
}

/// Fixed reply body for a category.
pub fn template_reply(category: Category, from: Option<&str>) -> String {
    let name = extract_first_name(from);

    match category {
        Category::Interested => format!(
            "Thank you for your interest, {name}.\n\n\
             I appreciate you reaching out regarding our services. I'd be happy to provide you with \
             more detailed information about how we can help meet your needs.\n\n\
             Would you be available for a brief call this week to discuss your requirements in more \
             detail? I can walk you through our solutions and answer any questions you might have.\n\n\
             Please let me know what times work best for you, and I'll send over a calendar invitation.\n\n\
             Best regards,\n[Your Name]"
        ),
        Category::MeetingBooked => format!(
            "Thank you for confirming our meeting, {name}.\n\n\
             I have this appointment noted in my calendar and look forward to our discussion. I'll make \
             sure to prepare relevant materials and come ready to address your specific needs.\n\n\
             If you need to make any changes to the meeting details or have any questions beforehand, \
             please don't hesitate to reach out.\n\n\
             See you soon!\n\n\
             Best regards,\n[Your Name]"
        ),
        Category::NotInterested => format!(
            "Thank you for taking the time to respond, {name}.\n\n\
             I completely understand that our solution may not be the right fit at this time. I \
             appreciate your honesty in letting me know.\n\n\
             If circumstances change in the future or if you'd like me to check back in a few months, \
             please feel free to reach out. I'll make sure to remove you from our immediate outreach list.\n\n\
             Wishing you all the best with your current initiatives.\n\n\
             Best regards,\n[Your Name]"
        ),
        Category::OutOfOffice => format!(
            "Thank you for the update, {name}.\n\n\
             I hope you have a wonderful time away from the office. I'll make sure to follow up with you \
             after your return date.\n\n\
             Enjoy your time off!\n\n\
             Best regards,\n[Your Name]"
        ),
        Category::Spam => "This appears to be an unsolicited message and will not receive a response.\n\n\
             If this is a legitimate business inquiry, please resend your message with clear \
             identification of your company and the purpose of your communication."
            .to_string(),
        Category::Uncategorized => format!(
            "Thank you for your email, {name}.\n\n\
             I've received your message and will review it carefully. I'll get back to you within 1-2 \
             business days with a detailed response.\n\n\
             If this is urgent, please feel free to call me directly.\n\n\
             Best regards,\n[Your Name]"
        ),
    }
}
