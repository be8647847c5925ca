//! Command dispatch.

pub mod demo;

use anyhow::Result;

use crate::cli::Commands;
use crate::render::face_glyph;
use dice::{DieFace, ServiceConfig};

pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Demo { participants, rolls } => demo::run(participants, rolls).await,
        Commands::Show { face } => {
            let face = DieFace::new(face)?;
            println!("{} {}", face_glyph(face), face);
            Ok(())
        }
        Commands::Config => {
            let config = ServiceConfig::from_env();
            match &config {
                ServiceConfig::Local { user } => {
                    println!("service: local (in-process relay)");
                    println!("user:    {} ({})", user.id, user.name);
                }
                ServiceConfig::Remote {
                    endpoint,
                    tenant_id,
                    user,
                    ..
                } => {
                    println!("service: remote");
                    println!("endpoint: {endpoint}");
                    println!("tenant:   {tenant_id}");
                    println!("user:     {} ({})", user.id, user.name);
                }
            }
            Ok(())
        }
    }
}
