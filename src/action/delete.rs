use super::Run;
use crate::errors::CrudError;
use crate::event::Event;
use crate::render::Outcome;

/// Delete the record and redirect to the index, whether or not it worked
pub(super) async fn handle(run: &mut Run<'_>) -> Result<Outcome, CrudError> {
    let id = run.id()?;
    let entity = run.find_record(&id).await?;

    if run.fire(Event::BeforeDelete)?.stopped {
        run.subject.insert("success", false);
        run.set_flash("error")?;
        let url = run.index_url();
        return run.redirect(url);
    }

    let deleted = run.env.repository.delete(&entity).await?;
    run.subject.insert("success", deleted);
    run.fire(Event::AfterDelete)?;
    run.set_flash(if deleted { "success" } else { "error" })?;

    let url = run.index_url();
    run.redirect(url)
}
