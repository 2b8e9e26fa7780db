//! Static field-to-mode table for the shipped collection policies.
//!
//! One row per `collection.field`. Fields without a row are hidden,
//! regardless of who asks.

use std::borrow::Cow;

/// The restriction mode governing one field, or `None` if the field is
/// hidden.
pub(crate) fn field_mode(collection: &str, field: &str) -> Option<&'static str> {
    let mode = match (collection, field) {
        ("meeting", "id") => "A",
        ("meeting", "enable_anonymous") => "A",
        ("meeting", "name") => "B",
        ("meeting", "description") => "B",
        ("meeting", "user_ids") => "B",
        ("meeting", "group_ids") => "B",
        ("meeting", "committee_id") => "B",
        ("meeting", "template_for_organization_id") => "B",
        ("meeting", "default_group_id") => "B",
        ("meeting", "admin_group_id") => "B",
        ("meeting", "welcome_title") => "C",
        ("meeting", "welcome_text") => "C",
        ("meeting", "conference_stream_url") => "D",
        ("meeting", "conference_stream_poster_url") => "D",

        ("user", "id") => "A",
        ("user", "username") => "B",
        ("user", "first_name") => "B",
        ("user", "last_name") => "B",
        ("user", "meeting_ids") => "B",
        ("user", "group_$_ids") => "B",
        ("user", "committee_management_ids") => "B",
        ("user", "organization_management_level") => "B",

        ("committee", "id") => "A",
        ("committee", "name") => "A",
        ("committee", "description") => "A",
        ("committee", "organization_id") => "A",
        ("committee", "user_ids") => "B",
        ("committee", "manager_ids") => "B",

        ("organization", "id") => "A",
        ("organization", "name") => "A",
        ("organization", "description") => "A",
        ("organization", "login_text") => "A",

        _ => return None,
    };
    Some(mode)
}

/// Normalizes a structured field like `group_$7_ids` to its template form
/// `group_$_ids` for the mode lookup.
pub(crate) fn template_form(field: &str) -> Cow<'_, str> {
    let Some(position) = field.find('$') else {
        return Cow::Borrowed(field);
    };
    let rest = &field[position + 1..];
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits == 0 {
        return Cow::Borrowed(field);
    }
    Cow::Owned(format!("{}${}", &field[..position], &rest[digits..]))
}
