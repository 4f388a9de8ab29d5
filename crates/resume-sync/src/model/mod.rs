//! # Data Model
//!
//! Documents ([`Resume`], [`Profile`]), their sections, the [`ProfileLink`] that derives a
//! resume from a profile, and typed partial updates.
//!
//! All types serialize with camelCase field names, which is both the REST wire format and
//! the local storage format.

mod content;
mod link;
mod patch;
mod profile;
mod resume;

pub use content::{
    Certification, Education, Experience, Link, PersonalInfo, ProfileContent, ResumeContent,
    Skills,
};
pub use link::{ProfileLink, ResumeOverrides, SectionFilter, SectionSelection, SkillSelection};
pub use patch::{ContentPatch, EducationPatch, ExperiencePatch, PersonalInfoPatch, SkillsPatch};
pub use profile::{Profile, ProfileDraft, ProfilePatch};
pub use resume::{Resume, ResumeDraft, ResumePatch};
