use crate::{
    auth::UserInfo,
    config::external_url,
    errors::AppError,
    gallery,
    models::{split_people, Photo, PhotoFields, Profile},
    AppState,
};
use axum::{
    extract::{Form, Multipart, Path, Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

// Session keys
const CREDENTIALS_KEY: &str = "credentials";
const USER_KEY: &str = "user";
const STATE_KEY: &str = "state";
const ERROR_MESSAGE_KEY: &str = "error_message";
const LOGIN_RETURN_KEY: &str = "login_return";
const PREFERRED_LANGUAGE_KEY: &str = "preferred_language";

const DEFAULT_LANGUAGE: &str = "en";

fn render(state: &AppState, template: &str, context: &tera::Context) -> Result<Response, AppError> {
    let body = state.tera.render(template, context)?;
    Ok(Html(body).into_response())
}

fn page_context(user: &Option<UserInfo>) -> tera::Context {
    let mut context = tera::Context::new();
    context.insert("user", user);
    context
}

async fn current_user(session: &Session) -> Result<Option<UserInfo>, AppError> {
    Ok(session.get::<UserInfo>(USER_KEY).await?)
}

/// Remembers where to come back to and sends the browser to `/login`.
async fn login_redirect(session: &Session, return_to: String) -> Result<Response, AppError> {
    session.insert(LOGIN_RETURN_KEY, return_to).await?;
    Ok(Redirect::to("/login").into_response())
}

async fn take_login_return(session: &Session) -> Result<String, AppError> {
    Ok(session
        .remove::<String>(LOGIN_RETURN_KEY)
        .await?
        .unwrap_or_else(|| "/".to_string()))
}

async fn error_redirect(session: &Session, message: String) -> Result<Response, AppError> {
    session.insert(ERROR_MESSAGE_KEY, message).await?;
    Ok(Redirect::to("/error").into_response())
}

fn callback_uri(state: &AppState, headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    external_url(
        state.external_host_url.as_deref(),
        &format!("http://{}/oauth2callback", host),
    )
}

fn ensure_owner(photo: &Photo, user: &UserInfo) -> Result<(), AppError> {
    if photo.is_owned_by(&user.sub) {
        Ok(())
    } else {
        tracing::warn!(photo_id = %photo.id, user = %user.sub, "Rejected change to another user's photo");
        Err(AppError::Forbidden(photo.id.clone()))
    }
}

async fn load_photo(state: &AppState, photo_id: &str) -> Result<Photo, AppError> {
    state
        .photo_repo
        .get_by_id(photo_id)
        .await?
        .ok_or_else(|| AppError::PhotoNotFound(photo_id.to_string()))
}

/// Display an error stored in the session, once.
pub async fn error(State(state): State<Arc<AppState>>, session: Session) -> Result<Response, AppError> {
    let Some(message) = session.remove::<String>(ERROR_MESSAGE_KEY).await? else {
        return Ok(Redirect::to("/").into_response());
    };

    let mut context = page_context(&current_user(&session).await?);
    context.insert("error_message", &message);
    render(&state, "error.html", &context)
}

/// Login if not already logged in.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if current_user(&session).await?.is_some() {
        let target = take_login_return(&session).await?;
        return Ok(Redirect::to(&target).into_response());
    }

    let (authorization_url, csrf_state) = state.login_provider.authorize_url(&callback_uri(&state, &headers))?;
    tracing::info!(%authorization_url, "Redirecting to identity provider");

    // save state for verification on callback
    session.insert(STATE_KEY, csrf_state).await?;
    Ok(Redirect::to(&authorization_url).into_response())
}

#[derive(Deserialize, Debug)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Callback destination during the OAuth flow.
pub async fn oauth2callback(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    // probably access denied by the user
    if let Some(error) = params.error {
        return error_redirect(&session, error).await;
    }

    let stored_state = session.remove::<String>(STATE_KEY).await?;
    if stored_state.is_none() || stored_state != params.state {
        tracing::warn!("OAuth callback state mismatch");
        return error_redirect(&session, "Login session expired or was tampered with. Please try again.".to_string()).await;
    }
    let Some(code) = params.code else {
        return error_redirect(&session, "The identity provider returned no authorization code.".to_string()).await;
    };

    let login = match state.login_provider.exchange_code(&code, &callback_uri(&state, &headers)).await {
        Ok(login) => login,
        Err(e) => {
            tracing::error!(error = ?e, "OAuth code exchange failed");
            return error_redirect(&session, "Login failed. Please try again.".to_string()).await;
        }
    };

    let preferred_language = state
        .profile_repo
        .get(&login.user.email)
        .await?
        .and_then(|p| p.preferred_language);

    session.cycle_id().await?;
    session.insert(CREDENTIALS_KEY, login.access_token).await?;
    session.insert(USER_KEY, &login.user).await?;
    if let Some(language) = preferred_language {
        session.insert(PREFERRED_LANGUAGE_KEY, language).await?;
    }
    tracing::info!(user.sub = %login.user.sub, user.email = %login.user.email, "User logged in");

    let target = take_login_return(&session).await?;
    Ok(Redirect::to(&target).into_response())
}

/// Log out and return to the root page.
pub async fn logout(session: Session) -> Result<Response, AppError> {
    for key in [CREDENTIALS_KEY, USER_KEY, STATE_KEY, ERROR_MESSAGE_KEY, LOGIN_RETURN_KEY, PREFERRED_LANGUAGE_KEY] {
        session.remove_value(key).await?;
    }
    Ok(Redirect::to("/").into_response())
}

/// Display all photos.
pub async fn list_photos(State(state): State<Arc<AppState>>, session: Session) -> Result<Response, AppError> {
    let photos = state.photo_repo.list_by_description().await?;
    tracing::debug!("Listing {} photos", photos.len());

    let mut context = page_context(&current_user(&session).await?);
    context.insert("photos", &photos);
    render(&state, "list.html", &context)
}

/// View the details of a photo, with its description translated into the
/// viewer's preferred language when logged in.
pub async fn view_photo(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(photo_id): Path<String>,
) -> Result<Response, AppError> {
    let photo = load_photo(&state, &photo_id).await?;
    let user = current_user(&session).await?;

    let mut context = page_context(&user);
    context.insert("can_edit", &user.as_ref().is_some_and(|u| photo.is_owned_by(&u.sub)));

    let description = photo.description.as_deref().filter(|d| !d.trim().is_empty());
    if let (Some(description), Some(_)) = (description, &user) {
        let preferred_language = session
            .get::<String>(PREFERRED_LANGUAGE_KEY)
            .await?
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let translation = state.translator.translate(description, &preferred_language).await?;
        context.insert("translated_text", &translation.translated_text);
        context.insert("description_language", &state.languages.display_name(&translation.detected_language_code));
        context.insert("translation_language", &state.languages.display_name(&preferred_language));
    }

    context.insert("photo", &photo);
    render(&state, "view.html", &context)
}

/// Reads the add/edit form, uploading the image if one was attached.
/// A new upload replaces any `imageUrl` carried by the form.
async fn read_photo_form(state: &AppState, mut multipart: Multipart) -> Result<PhotoFields, AppError> {
    let mut fields = PhotoFields::default();
    let mut image: Option<(Option<String>, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        match field_name.as_str() {
            "image" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?.to_vec();
                // An empty file input is submitted with no name and no bytes.
                if !data.is_empty() {
                    image = Some((filename, content_type, data));
                }
            }
            "imageUrl" => fields.image_url = non_empty(field.text().await?),
            "name" => fields.name = Some(field.text().await?),
            "description" => fields.description = Some(field.text().await?),
            "dateTaken" => fields.date_taken = Some(field.text().await?),
            "peopleInPhoto" => fields.people_in_photo = split_people(&field.text().await?),
            _ => tracing::debug!("Ignoring unknown multipart field: {}", field_name),
        }
    }

    if let Some((filename, content_type, data)) = image {
        let url = gallery::store_image(state.file_storage.as_ref(), filename.as_deref(), content_type, data).await?;
        fields.image_url = Some(url);
    }
    Ok(fields)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Show the form to collect details of a new photo.
pub async fn add_photo_form(State(state): State<Arc<AppState>>, session: Session) -> Result<Response, AppError> {
    let Some(user) = current_user(&session).await? else {
        return login_redirect(&session, "/photos/add".to_string()).await;
    };

    let mut context = page_context(&Some(user));
    context.insert("action", "Add");
    context.insert("photo", &Photo::default());
    render(&state, "form.html", &context)
}

/// Create a new photo from the submitted form.
pub async fn add_photo(
    State(state): State<Arc<AppState>>,
    session: Session,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let Some(user) = current_user(&session).await? else {
        return login_redirect(&session, "/photos/add".to_string()).await;
    };

    let fields = read_photo_form(&state, multipart).await?;
    let photo = gallery::create_photo(state.photo_repo.as_ref(), fields, &user.sub).await?;

    Ok(Redirect::to(&format!("/photos/{}", photo.id)).into_response())
}

/// Show the form to collect updated details for a photo.
pub async fn edit_photo_form(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(photo_id): Path<String>,
) -> Result<Response, AppError> {
    let Some(user) = current_user(&session).await? else {
        return login_redirect(&session, format!("/photos/{}/edit", photo_id)).await;
    };

    let photo = load_photo(&state, &photo_id).await?;
    ensure_owner(&photo, &user)?;

    let mut context = page_context(&Some(user));
    context.insert("action", "Edit");
    context.insert("photo", &photo);
    render(&state, "form.html", &context)
}

/// Replace the photo document with the submitted form. Fields left out of
/// the form are not carried over.
pub async fn edit_photo(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(photo_id): Path<String>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let Some(user) = current_user(&session).await? else {
        return login_redirect(&session, format!("/photos/{}/edit", photo_id)).await;
    };

    let existing = load_photo(&state, &photo_id).await?;
    ensure_owner(&existing, &user)?;

    let fields = read_photo_form(&state, multipart).await?;
    let photo = Photo::from_fields(existing.id, fields, Some(user.sub));
    state.photo_repo.put(&photo).await?;
    tracing::info!(photo_id = %photo.id, "Photo overwritten via web form");

    Ok(Redirect::to(&format!("/photos/{}", photo.id)).into_response())
}

/// Delete the photo and its image, then return to the list.
pub async fn delete_photo(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(photo_id): Path<String>,
) -> Result<Response, AppError> {
    let Some(user) = current_user(&session).await? else {
        return login_redirect(&session, format!("/photos/{}", photo_id)).await;
    };

    let photo = load_photo(&state, &photo_id).await?;
    ensure_owner(&photo, &user)?;
    gallery::delete_photo(state.photo_repo.as_ref(), state.file_storage.as_ref(), &photo).await?;

    Ok(Redirect::to("/").into_response())
}

/// Show the profile form.
pub async fn profile_form(State(state): State<Arc<AppState>>, session: Session) -> Result<Response, AppError> {
    let Some(user) = current_user(&session).await? else {
        return login_redirect(&session, "/profile".to_string()).await;
    };

    let profile = state
        .profile_repo
        .get(&user.email)
        .await?
        .unwrap_or_else(|| Profile { email: user.email.clone(), preferred_language: None });

    let mut context = page_context(&Some(user));
    context.insert("action", "Edit");
    context.insert("profile", &profile);
    context.insert("selected_language", profile.preferred_language.as_deref().unwrap_or(DEFAULT_LANGUAGE));
    context.insert("languages", &language_options(&state));
    render(&state, "profile.html", &context)
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProfileForm {
    preferred_language: String,
}

/// Save the profile and use the new language for this session.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<ProfileForm>,
) -> Result<Response, AppError> {
    let Some(user) = current_user(&session).await? else {
        return login_redirect(&session, "/profile".to_string()).await;
    };

    let language = form.preferred_language.trim().to_string();
    if language.is_empty() {
        return Err(AppError::InvalidInput("preferredLanguage is required".to_string()));
    }

    state
        .profile_repo
        .put(&Profile { email: user.email.clone(), preferred_language: Some(language.clone()) })
        .await?;
    session.insert(PREFERRED_LANGUAGE_KEY, language).await?;
    tracing::info!(user.email = %user.email, "Profile updated");

    Ok(Redirect::to("/").into_response())
}

#[derive(serde::Serialize)]
struct LanguageOption<'a> {
    code: &'a str,
    display_name: &'a str,
}

fn language_options(state: &AppState) -> Vec<LanguageOption<'_>> {
    state
        .languages
        .all()
        .iter()
        .map(|l| LanguageOption { code: &l.code, display_name: &l.display_name })
        .collect()
}
