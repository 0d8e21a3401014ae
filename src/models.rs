use serde::{Deserialize, Deserializer, Serialize};

/// A stored gallery photo. Serialised in camelCase because that is the
/// shape the callable client and the templates read.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date_taken: Option<String>,
    #[serde(default, deserialize_with = "deserialize_people")]
    pub people_in_photo: Vec<String>,
    #[serde(default)]
    pub uploader_id: Option<String>,
}

impl Photo {
    /// Builds a whole document from submitted fields. Used by create and by
    /// the overwrite path of the web editor.
    pub fn from_fields(id: String, fields: PhotoFields, uploader_id: Option<String>) -> Self {
        Photo {
            id,
            image_url: fields.image_url,
            name: fields.name,
            description: fields.description,
            date_taken: fields.date_taken,
            people_in_photo: fields.people_in_photo,
            uploader_id,
        }
    }

    pub fn is_owned_by(&self, caller: &str) -> bool {
        self.uploader_id.as_deref() == Some(caller)
    }
}

/// User-editable photo attributes as they arrive from a form or a callable
/// payload.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoFields {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date_taken: Option<String>,
    #[serde(default, deserialize_with = "deserialize_people")]
    pub people_in_photo: Vec<String>,
}

/// A partial update. Only fields that are `Some` are written; everything
/// else on the stored document is left alone.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoPatch {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date_taken: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_people")]
    pub people_in_photo: Option<Vec<String>>,
}

/// Per-user settings, keyed by email.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email: String,
    #[serde(default)]
    pub preferred_language: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PeopleInput {
    List(Vec<String>),
    Text(String),
}

/// Splits a free-text "Alice, Bob" entry into names.
pub fn split_people(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalise_people(input: PeopleInput) -> Vec<String> {
    match input {
        PeopleInput::List(names) => names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect(),
        PeopleInput::Text(raw) => split_people(&raw),
    }
}

fn deserialize_people<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let input = Option::<PeopleInput>::deserialize(deserializer)?;
    Ok(input.map(normalise_people).unwrap_or_default())
}

fn deserialize_optional_people<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let input = Option::<PeopleInput>::deserialize(deserializer)?;
    Ok(input.map(normalise_people))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn people_accepts_list_or_comma_separated_text() {
        let from_text: PhotoFields =
            serde_json::from_value(json!({ "peopleInPhoto": "Ann,  Bo ,," })).unwrap();
        assert_eq!(from_text.people_in_photo, vec!["Ann", "Bo"]);

        let from_list: PhotoFields =
            serde_json::from_value(json!({ "peopleInPhoto": ["Ann", " "] })).unwrap();
        assert_eq!(from_list.people_in_photo, vec!["Ann"]);

        let missing: PhotoFields = serde_json::from_value(json!({})).unwrap();
        assert!(missing.people_in_photo.is_empty());
    }

    #[test]
    fn patch_only_carries_supplied_fields() {
        let patch: PhotoPatch =
            serde_json::from_value(json!({ "description": "beach", "peopleInPhoto": null })).unwrap();
        assert_eq!(patch.description.as_deref(), Some("beach"));
        assert!(patch.people_in_photo.is_none());
        assert!(patch.name.is_none());
    }

    #[test]
    fn ownership_requires_matching_uploader() {
        let mut photo = Photo { id: "p1".into(), ..Default::default() };
        assert!(!photo.is_owned_by("alice"));
        photo.uploader_id = Some("alice".into());
        assert!(photo.is_owned_by("alice"));
        assert!(!photo.is_owned_by("bob"));
    }
}
