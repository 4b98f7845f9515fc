use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::Credential;
use crate::scraping::{PageDriver, WaitState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginFailure {
    #[error("login page did not load: {0}")]
    Navigation(String),
    #[error("login form could not be submitted: {0}")]
    Submit(String),
    #[error("credentials rejected: still on the login page after {0:?}")]
    Rejected(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    Failure(LoginFailure),
}

/// Selectors of a site's sign-in form.
#[derive(Debug, Clone, Copy)]
pub struct LoginForm {
    pub url: &'static str,
    pub cookie_decline: Option<&'static str>,
    pub identity_field: &'static str,
    pub secret_field: &'static str,
    pub submit: &'static str,
    /// Path fragment of the form page. Sign-in succeeded once the URL no longer contains it.
    pub form_path: &'static str,
}

/// A modal the account must click through once, e.g. updated terms of service.
#[derive(Debug, Clone, Copy)]
pub struct TermsDialog {
    pub container: &'static str,
    pub accept_checkbox: Option<&'static str>,
    pub confirm: &'static str,
}

const MARKER_POLL: Duration = Duration::from_millis(250);

/// Fills and submits the form. Failures are reported, never retried here.
pub async fn login(
    driver: &dyn PageDriver,
    form: &LoginForm,
    credential: &Credential,
    marker_timeout: Duration,
) -> LoginOutcome {
    info!("Opening login page {}", form.url);
    if let Err(e) = driver.goto(form.url).await {
        return LoginOutcome::Failure(LoginFailure::Navigation(e.to_string()));
    }

    if let Some(decline) = form.cookie_decline {
        dismiss_cookie_banner(driver, decline, marker_timeout).await;
    }

    debug!("Filling login form");
    if let Err(e) = submit_form(driver, form, credential).await {
        return LoginOutcome::Failure(LoginFailure::Submit(e.to_string()));
    }

    match wait_until_url_leaves(driver, form.form_path, marker_timeout).await {
        Ok(true) => LoginOutcome::Success,
        Ok(false) => LoginOutcome::Failure(LoginFailure::Rejected(marker_timeout)),
        Err(e) => LoginOutcome::Failure(LoginFailure::Submit(e.to_string())),
    }
}

async fn dismiss_cookie_banner(driver: &dyn PageDriver, selector: &str, wait: Duration) {
    let dismissed = async {
        driver.wait_for(selector, WaitState::Visible, wait).await?;
        driver.click(selector).await
    };
    match dismissed.await {
        Ok(()) => debug!("Cookie consent declined"),
        Err(e) => debug!("No cookie consent dialog: {}", e),
    }
}

async fn submit_form(
    driver: &dyn PageDriver,
    form: &LoginForm,
    credential: &Credential,
) -> Result<(), AppError> {
    driver.fill(form.identity_field, &credential.identity).await?;
    driver.fill(form.secret_field, &credential.secret).await?;
    driver.click(form.submit).await
}

async fn wait_until_url_leaves(
    driver: &dyn PageDriver,
    fragment: &str,
    wait: Duration,
) -> Result<bool, AppError> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        if !driver.current_url().await?.contains(fragment) {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(MARKER_POLL).await;
    }
}

/// Best effort: a missing dialog is the common case and not an error.
pub async fn dismiss_terms_dialog(driver: &dyn PageDriver, dialog: &TermsDialog, wait: Duration) {
    if driver
        .wait_for(dialog.container, WaitState::Visible, wait)
        .await
        .is_err()
    {
        debug!("Terms dialog not shown");
        return;
    }

    info!("Accepting terms dialog");
    let accepted = async {
        if let Some(checkbox) = dialog.accept_checkbox {
            driver.click(checkbox).await?;
        }
        driver.click(dialog.confirm).await?;
        driver
            .wait_for(dialog.container, WaitState::Detached, wait)
            .await
    };
    if let Err(e) = accepted.await {
        warn!("Terms dialog could not be dismissed: {}", e);
    }
}
