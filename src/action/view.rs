use super::Run;
use crate::errors::CrudError;
use crate::render::Outcome;

pub(super) async fn handle(run: &mut Run<'_>) -> Result<Outcome, CrudError> {
    let id = run.id()?;
    run.find_record(&id).await?;
    run.render().await
}
