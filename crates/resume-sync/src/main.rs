use anyhow::{Context, Result};
use resume_sync::model::{
    ContentPatch, Experience, PersonalInfo, PersonalInfoPatch, ProfileDraft, ProfileLink,
    ResumeContent, ResumePatch, SectionFilter,
};
use resume_sync::resolver::has_drifted;
use resume_sync::{StaticSession, SyncConfig, SyncSystem};
use std::sync::Arc;
use sync_framework::tracing::setup_tracing;
use tracing::{info, Instrument};

#[tokio::main]
async fn main() -> Result<()> {
    // Setup tracing once for the entire application
    setup_tracing();

    let config = SyncConfig::from_env()?;
    let debounce = config.debounce;
    let session = Arc::new(StaticSession::new(config.session));
    let system = SyncSystem::new(config, session).await?;
    info!(mode = %system.mode(), "Starting resume sync demo");

    let existing = system.list_resumes().await?;
    info!(count = existing.len(), "Loaded resumes");

    // A master profile to derive from
    let profile = async {
        system
            .create_profile(ProfileDraft {
                name: format!("Profile {}", existing.len() + 1),
                description: Some("Created by the demo".into()),
                content: ResumeContent {
                    personal_info: PersonalInfo {
                        name: "Sam Rivera".into(),
                        title: "Platform Engineer".into(),
                        summary: "Builds the paths other engineers ship on.".into(),
                        ..Default::default()
                    },
                    experience: vec![
                        Experience {
                            id: "exp-1".into(),
                            company: "Acme".into(),
                            position: "Staff Engineer".into(),
                            ..Default::default()
                        },
                        Experience {
                            id: "exp-2".into(),
                            company: "Initech".into(),
                            position: "Engineer".into(),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                },
            })
            .await
    }
    .instrument(tracing::info_span!("profile_creation"))
    .await
    .context("creating profile")?;
    info!(profile_id = %profile.id, "Profile created");

    // A resume that only takes the latest role
    let mut link = ProfileLink::all(profile.id.clone());
    link.selection.experience_ids = SectionFilter::only(["exp-1"]);
    let resume = system
        .create_linked_resume("Platform roles", link)
        .await
        .context("creating linked resume")?;
    info!(resume_id = %resume.id, roles = resume.content.experience.len(), "Linked resume created");

    // A burst of live edits, saved as one write
    for name in ["S. Rivera", "Sam R.", "Sam Rivera, PhD"] {
        system.edit_resume(
            &resume.id,
            ResumePatch::content(ContentPatch {
                personal_info: Some(PersonalInfoPatch {
                    name: Some(name.into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        );
    }
    tokio::time::sleep(debounce + std::time::Duration::from_millis(100)).await;
    let status = system.autosave.status(&resume.id);
    info!(saved = status.last_saved.is_some(), "Autosave settled");

    let edited = system.get_resume(&resume.id).await?;
    info!(
        drifted = has_drifted(&edited, &profile),
        "Resume edited away from its profile"
    );
    let refreshed = system.refresh_from_profile(&resume.id).await?;
    info!(name = %refreshed.content.personal_info.name, "Resume refreshed from profile");

    let copy = system.duplicate_resume(&resume.id).await?;
    info!(title = %copy.title, "Resume duplicated");

    let all = system.list_resumes().await?;
    info!(count = all.len(), "Final resume count");

    system.shutdown().await?;
    info!("Demo complete");
    Ok(())
}
