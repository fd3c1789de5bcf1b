use std::sync::Arc;

use cookie::{Cookie, SameSite};
use log::{error, info};
use warp::filters::BoxedFilter;
use warp::http::{header, HeaderValue, StatusCode};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::backend::Repository;
use crate::feedback::FeedbackId;
use crate::forms::{FeedbackForm, FormErrors, LoginForm, RegisterForm};
use crate::session::{Category, Flash, Session, SessionId, Sessions};
use crate::site::{Error, Site};
use crate::user::UniqueField;
use crate::views;

pub const SESSION_COOKIE: &str = "sessionid";
const FORM_LIMIT: u64 = 64 * 1024;
// only shown if a denial turns out to be something else
const DENIED: &str = "There was an error loading that page.";

pub struct App<R> {
    site: Site<R>,
    sessions: Sessions,
    secure: bool,
}

/// The session of the current request, written back when the response is built.
pub struct Ctx {
    id: SessionId,
    session: Session,
    replaces: Option<SessionId>,
}

impl Ctx {
    /// Logs in under a new session id, the old one stops resolving.
    fn login(&mut self, username: &str) {
        self.session.login(username);

        let old = std::mem::replace(&mut self.id, SessionId::new());
        self.replaces.get_or_insert(old);
    }
}

impl<R: Repository> App<R> {
    pub fn new(site: Site<R>, sessions: Sessions, secure: bool) -> Self {
        Self {
            site,
            sessions,
            secure,
        }
    }

    async fn load(&self, id: Option<SessionId>) -> Ctx {
        let (id, session) = self.sessions.load(self.site.backend(), id).await;

        Ctx {
            id,
            session,
            replaces: None,
        }
    }

    async fn finish(&self, ctx: Ctx, reply: impl Reply) -> Response {
        let mut response = reply.into_response();

        let Ctx {
            id,
            session,
            replaces,
        } = ctx;
        self.sessions
            .store(self.site.backend(), id, &session, replaces)
            .await;

        let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .build();

        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => error!("couldn't encode session cookie: {e}"),
        }
        response
    }

    async fn render(&self, mut ctx: Ctx, view: impl FnOnce(&[Flash]) -> String) -> Response {
        let flashes = ctx.session.take_flashes();
        let html = view(&flashes);
        self.finish(ctx, warp::reply::html(html)).await
    }

    async fn not_found(&self, ctx: Ctx) -> Response {
        let mut response = self.render(ctx, views::not_found).await;
        *response.status_mut() = StatusCode::NOT_FOUND;
        response
    }

    /// Turns a failed operation into the response the visitor sees.
    async fn fail(&self, mut ctx: Ctx, e: Error, fallback: &str, notice: &str) -> Response {
        match e {
            Error::NotFound => self.not_found(ctx).await,
            Error::Unauthorized => {
                ctx.session
                    .flash(Category::Error, "You must be logged in to view that page.");
                self.finish(ctx, redirect("/login")).await
            }
            Error::Forbidden => {
                ctx.session
                    .flash(Category::Error, "You don't have permission to view that page.");
                self.finish(ctx, redirect("/login")).await
            }
            Error::Internal | Error::Taken(_) => {
                ctx.session.flash(Category::Error, notice);
                self.finish(ctx, redirect(fallback)).await
            }
        }
    }
}

fn redirect(location: &str) -> impl Reply {
    warp::reply::with_header(
        warp::reply::with_status(warp::reply(), StatusCode::SEE_OTHER),
        header::LOCATION,
        location,
    )
}

fn user_path(username: &str) -> String {
    format!("/users/{username}")
}

fn with_ctx<R>(app: Arc<App<R>>) -> BoxedFilter<(Arc<App<R>>, Ctx)>
where
    R: Repository + 'static,
{
    warp::cookie::optional::<String>(SESSION_COOKIE)
        .and_then(move |cookie: Option<String>| {
            let app = Arc::clone(&app);
            async move {
                let id = cookie.and_then(|c| c.parse().ok());
                let ctx = app.load(id).await;
                Ok::<_, Rejection>((app, ctx))
            }
        })
        .untuple_one()
        .boxed()
}

fn form<T>() -> BoxedFilter<(T,)>
where
    T: serde::de::DeserializeOwned + Send + 'static,
{
    warp::body::content_length_limit(FORM_LIMIT)
        .and(warp::body::form())
        .boxed()
}

pub fn routes<R>(app: Arc<App<R>>) -> BoxedFilter<(Response,)>
where
    R: Repository + 'static,
{
    let ctx = || with_ctx(Arc::clone(&app));

    let index = warp::path::end()
        .and(warp::get())
        .map(|| redirect("/register").into_response());

    let register = warp::path!("register")
        .and(warp::get())
        .and(ctx())
        .and_then(register_form::<R>)
        .or(warp::path!("register")
            .and(warp::post())
            .and(ctx())
            .and(form::<RegisterForm>())
            .and_then(register::<R>))
        .unify();

    let login = warp::path!("login")
        .and(warp::get())
        .and(ctx())
        .and_then(login_form::<R>)
        .or(warp::path!("login")
            .and(warp::post())
            .and(ctx())
            .and(form::<LoginForm>())
            .and_then(login::<R>))
        .unify();

    let logout = warp::path!("logout")
        .and(warp::get())
        .and(ctx())
        .and_then(logout::<R>);

    let users = {
        let show = warp::path!("users" / String)
            .and(warp::get())
            .and(ctx())
            .and_then(show_user::<R>);

        let delete = warp::path!("users" / String / "delete")
            .and(warp::post())
            .and(ctx())
            .and_then(delete_user::<R>);

        let add_form = warp::path!("users" / String / "feedback" / "add")
            .and(warp::get())
            .and(ctx())
            .and_then(add_feedback_form::<R>);

        let add = warp::path!("users" / String / "feedback" / "add")
            .and(warp::post())
            .and(ctx())
            .and(form::<FeedbackForm>())
            .and_then(add_feedback::<R>);

        show.or(delete)
            .unify()
            .or(add_form)
            .unify()
            .or(add)
            .unify()
    };

    let feedback = {
        let edit_form = warp::path!("feedback" / FeedbackId / "update")
            .and(warp::get())
            .and(ctx())
            .and_then(edit_feedback_form::<R>);

        let edit = warp::path!("feedback" / FeedbackId / "update")
            .and(warp::post())
            .and(ctx())
            .and(form::<FeedbackForm>())
            .and_then(edit_feedback::<R>);

        let delete = warp::path!("feedback" / FeedbackId / "delete")
            .and(warp::post())
            .and(ctx())
            .and_then(delete_feedback::<R>);

        edit_form.or(edit).unify().or(delete).unify()
    };

    index
        .or(register)
        .unify()
        .or(login)
        .unify()
        .or(logout)
        .unify()
        .or(users)
        .unify()
        .or(feedback)
        .unify()
        .with(warp::log("feedback"))
        .map(Reply::into_response)
        .boxed()
}

type Handled = Result<Response, Rejection>;

/// Where a logged in session is sent instead of the login/register forms.
fn already_in(session: &Session) -> Option<String> {
    session.username().map(user_path)
}

async fn register_form<R: Repository>(app: Arc<App<R>>, ctx: Ctx) -> Handled {
    if let Some(path) = already_in(&ctx.session) {
        return Ok(app.finish(ctx, redirect(&path)).await);
    }

    Ok(app.render(ctx, |flashes| {
        views::register(&RegisterForm::default(), &FormErrors::default(), flashes)
    }).await)
}

async fn register<R: Repository>(app: Arc<App<R>>, mut ctx: Ctx, form: RegisterForm) -> Handled {
    if let Some(path) = already_in(&ctx.session) {
        return Ok(app.finish(ctx, redirect(&path)).await);
    }

    let registration = match form.clean() {
        Ok(r) => r,
        Err(errors) => {
            return Ok(app.render(ctx, |flashes| views::register(&form, &errors, flashes)).await);
        }
    };

    match app.site.register(registration).await {
        Ok(user) => {
            ctx.login(&user.username);
            ctx.session.flash(
                Category::Success,
                format!(
                    "Welcome!  Your new account has been created for {}",
                    user.username
                ),
            );
            Ok(app.finish(ctx, redirect(&user_path(&user.username))).await)
        }
        Err(Error::Taken(field)) => {
            let mut errors = FormErrors::default();
            let what = match field {
                UniqueField::Username => "Username",
                UniqueField::Email => "Email",
            };
            errors.add(field.name(), format!("{what} taken.  Please pick another"));

            Ok(app.render(ctx, |flashes| views::register(&form, &errors, flashes)).await)
        }
        Err(_) => {
            ctx.session
                .flash(Category::Error, "There was an error creating your account.");
            Ok(app.render(ctx, |flashes| {
                views::register(&form, &FormErrors::default(), flashes)
            }).await)
        }
    }
}

async fn login_form<R: Repository>(app: Arc<App<R>>, ctx: Ctx) -> Handled {
    if let Some(path) = already_in(&ctx.session) {
        return Ok(app.finish(ctx, redirect(&path)).await);
    }

    Ok(app.render(ctx, |flashes| {
        views::login(&LoginForm::default(), &FormErrors::default(), flashes)
    }).await)
}

async fn login<R: Repository>(app: Arc<App<R>>, mut ctx: Ctx, form: LoginForm) -> Handled {
    if let Some(path) = already_in(&ctx.session) {
        return Ok(app.finish(ctx, redirect(&path)).await);
    }

    let mut errors = match form.clean() {
        Ok(()) => FormErrors::default(),
        Err(errors) => {
            return Ok(app.render(ctx, |flashes| views::login(&form, &errors, flashes)).await);
        }
    };

    match app.site.authenticate(&form.username, &form.password).await {
        Ok(Some(user)) => {
            ctx.login(&user.username);
            ctx.session.flash(
                Category::Success,
                format!("Welcome Back, {}!", user.username),
            );
            Ok(app.finish(ctx, redirect(&user_path(&user.username))).await)
        }
        Ok(None) => {
            errors.add("username", "Invalid username/password.");
            Ok(app.render(ctx, |flashes| views::login(&form, &errors, flashes)).await)
        }
        Err(_) => {
            ctx.session
                .flash(Category::Error, "There was an error logging in.");
            Ok(app.render(ctx, |flashes| views::login(&form, &errors, flashes)).await)
        }
    }
}

async fn logout<R: Repository>(app: Arc<App<R>>, mut ctx: Ctx) -> Handled {
    if let Some(username) = ctx.session.username() {
        info!("{username} logout");
    }
    ctx.session.logout();
    ctx.session.flash(Category::Success, "You are logged out.");

    Ok(app.finish(ctx, redirect("/")).await)
}

async fn show_user<R: Repository>(username: String, app: Arc<App<R>>, ctx: Ctx) -> Handled {
    let user = match app.site.user(&username).await {
        Ok(user) => user,
        Err(e) => return Ok(app.fail(ctx, e, "/", "There was an error loading that page.").await),
    };

    let feedback = match app.site.authorize(&ctx.session, &username) {
        Ok(authed) => authed.feedback().await,
        Err(e) => Err(e),
    };

    match feedback {
        Ok(feedback) => Ok(app.render(ctx, |flashes| views::user(&user, &feedback, flashes)).await),
        Err(e) => Ok(app.fail(ctx, e, "/", "There was an error loading that page.").await),
    }
}

async fn delete_user<R: Repository>(username: String, app: Arc<App<R>>, mut ctx: Ctx) -> Handled {
    // a single lookup: it 404s if missing, and the delete itself is atomic
    if let Err(e) = app.site.user(&username).await {
        return Ok(app.fail(ctx, e, "/", "There was an error deleting the user").await);
    }

    let result = match app.site.authorize(&ctx.session, &username) {
        Ok(authed) => authed.delete_account().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(_) => {
            ctx.session.logout();
            ctx.session.flash(Category::Success, "User deleted");
            Ok(app.finish(ctx, redirect("/")).await)
        }
        // the session is left as it was
        Err(e) => Ok(app.fail(
            ctx,
            e,
            &user_path(&username),
            "There was an error deleting the user",
        ).await),
    }
}

async fn add_feedback_form<R: Repository>(username: String, app: Arc<App<R>>, ctx: Ctx) -> Handled {
    if let Err(e) = app.site.authorize(&ctx.session, &username) {
        return Ok(app.fail(ctx, e, "/", DENIED).await);
    }

    let action = format!("{}/feedback/add", user_path(&username));
    Ok(app.render(ctx, |flashes| {
        views::feedback(
            "Add Feedback",
            &action,
            &FeedbackForm::default(),
            &FormErrors::default(),
            flashes,
        )
    }).await)
}

async fn add_feedback<R: Repository>(
    username: String,
    app: Arc<App<R>>,
    mut ctx: Ctx,
    form: FeedbackForm,
) -> Handled {
    let authed = match app.site.authorize(&ctx.session, &username) {
        Ok(authed) => authed,
        Err(e) => return Ok(app.fail(ctx, e, "/", DENIED).await),
    };

    let action = format!("{}/feedback/add", user_path(&username));
    if let Err(errors) = form.clean() {
        return Ok(app.render(ctx, |flashes| {
            views::feedback("Add Feedback", &action, &form, &errors, flashes)
        }).await);
    }

    match authed.add_feedback(&form.title, &form.content).await {
        Ok(_) => {
            ctx.session.flash(Category::Success, "Feedback submitted!");
            Ok(app.finish(ctx, redirect(&user_path(&username))).await)
        }
        Err(_) => {
            ctx.session.flash(Category::Error, "Error submitting feedback.");
            Ok(app.render(ctx, |flashes| {
                views::feedback(
                    "Add Feedback",
                    &action,
                    &form,
                    &FormErrors::default(),
                    flashes,
                )
            }).await)
        }
    }
}

async fn edit_feedback_form<R: Repository>(id: FeedbackId, app: Arc<App<R>>, ctx: Ctx) -> Handled {
    let fb = match app.site.feedback(id).await {
        Ok(fb) => fb,
        Err(e) => return Ok(app.fail(ctx, e, "/", "There was an error loading that page.").await),
    };

    if let Err(e) = app.site.authorize(&ctx.session, &fb.username) {
        return Ok(app.fail(ctx, e, "/", DENIED).await);
    }

    let action = format!("/feedback/{id}/update");
    Ok(app.render(ctx, |flashes| {
        views::feedback(
            "Edit Feedback",
            &action,
            &FeedbackForm::from(&fb),
            &FormErrors::default(),
            flashes,
        )
    }).await)
}

async fn edit_feedback<R: Repository>(
    id: FeedbackId,
    app: Arc<App<R>>,
    mut ctx: Ctx,
    form: FeedbackForm,
) -> Handled {
    // ownership depends on the stored item, so load it first
    let fb = match app.site.feedback(id).await {
        Ok(fb) => fb,
        Err(e) => return Ok(app.fail(ctx, e, "/", "There was an error loading that page.").await),
    };

    let authed = match app.site.authorize(&ctx.session, &fb.username) {
        Ok(authed) => authed,
        Err(e) => return Ok(app.fail(ctx, e, "/", DENIED).await),
    };

    let action = format!("/feedback/{id}/update");
    if let Err(errors) = form.clean() {
        return Ok(app.render(ctx, |flashes| {
            views::feedback("Edit Feedback", &action, &form, &errors, flashes)
        }).await);
    }

    let back = user_path(authed.username());
    match authed.update_feedback(fb, &form.title, &form.content).await {
        Ok(fb) => {
            ctx.session
                .flash(Category::Success, format!("Updated feedback: {}", fb.title));
            Ok(app.finish(ctx, redirect(&back)).await)
        }
        Err(e) => Ok(app.fail(ctx, e, &back, "There was an error updating the feedback").await),
    }
}

async fn delete_feedback<R: Repository>(id: FeedbackId, app: Arc<App<R>>, mut ctx: Ctx) -> Handled {
    let fb = match app.site.feedback(id).await {
        Ok(fb) => fb,
        Err(e) => {
            let notice = "There was an error deleting the feedback";
            return Ok(app.fail(ctx, e, "/", notice).await);
        }
    };

    let authed = match app.site.authorize(&ctx.session, &fb.username) {
        Ok(authed) => authed,
        Err(e) => return Ok(app.fail(ctx, e, "/", DENIED).await),
    };

    let back = user_path(authed.username());
    match authed.delete_feedback(fb).await {
        Ok(()) => {
            ctx.session.flash(Category::Success, "Feedback deleted");
            Ok(app.finish(ctx, redirect(&back)).await)
        }
        Err(e) => Ok(app.fail(ctx, e, &back, "There was an error deleting the feedback").await),
    }
}
