use super::Run;
use crate::errors::CrudError;
use crate::event::Event;
use crate::pagination::{calculate_content_range, page_params, with_page};
use crate::render::{Outcome, Redirect};
use crate::subject::Value;

/// Paginate the finder's results. A page past the end redirects to the last page.
pub(super) async fn handle(run: &mut Run<'_>) -> Result<Outcome, CrudError> {
    let repository = run.env.repository;
    let find = &run.config.find_method;
    let query = repository.query(&find.name, &find.options);
    run.subject
        .set([("success", Value::Bool(true)), ("query", query.into())]);
    run.fire(Event::BeforePaginate)?;

    let query = run.subject.query().cloned().unwrap_or_default();
    let request = run.env.request;
    let (page, limit) = page_params(
        request.query_value("page"),
        request.query_value("limit"),
        run.config.limit,
        run.config.max_limit,
    );
    let page = repository.paginate(&query, page, limit).await?;

    if page.is_out_of_range() {
        let last = page.page_count();
        run.subject.insert("success", false);
        run.fire(Event::RecordNotFound)?;
        tracing::debug!(requested = page.current_page, last, "Page out of range, redirecting");

        return Ok(Outcome::Redirect(Redirect {
            url: with_page(&request.path, &request.query_string(), last),
            status: 302,
            flash: std::mem::take(&mut run.flash),
        }));
    }

    run.view
        .headers
        .extend(calculate_content_range(&page, repository.resource_name_plural()));
    run.subject.set([
        ("entities", Value::from(page.items.clone())),
        ("page", page.into()),
    ]);
    run.fire(Event::AfterPaginate)?;
    run.render().await
}
