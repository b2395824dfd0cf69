pub mod create_user;
pub mod server;

// Interpreter for `Action`; the match lives in `run.rs`.
mod run;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    CreateUser(create_user::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
