//! # Content Resolver
//!
//! Computes a resume's effective content from a master [`Profile`] and the resume's
//! [`ProfileLink`]. Pure and deterministic: no I/O, no errors, and the profile is only ever
//! read.
//!
//! Each section is resolved independently:
//!
//! - **Personal info**: empty when excluded; otherwise the profile's record with the
//!   override patch on top. The summary is blanked when `includeSummary` is off.
//! - **Experience / education / certifications / links**: filtered by id in the profile's
//!   own order, then (experience and education only) per-item overrides, then additional
//!   items appended.
//! - **Skills**: the same rule per category, matched by name.
//!
//! An excluded section stays empty: additional items are only appended to sections that
//! are included.

use crate::model::{
    PersonalInfo, Profile, ProfileLink, Resume, ResumeContent, SectionFilter, Skills,
};

/// Resolver output: the content plus the requested section order, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResume {
    pub content: ResumeContent,
    pub section_order: Option<Vec<String>>,
}

pub fn resolve(profile: &Profile, link: &ProfileLink) -> ResolvedResume {
    let source = &profile.content;
    let selection = &link.selection;
    let overrides = link.overrides.clone().unwrap_or_default();

    let personal_info = if selection.include_personal_info {
        let mut info = match &overrides.personal_info {
            Some(patch) => patch.apply_to(&source.personal_info),
            None => source.personal_info.clone(),
        };
        if !selection.include_summary {
            info.summary.clear();
        }
        info
    } else {
        PersonalInfo::default()
    };

    let mut experience = selection
        .experience_ids
        .select(&source.experience, |e| e.id.as_str());
    for item in &mut experience {
        if let Some(patch) = overrides.experience_overrides.get(&item.id) {
            *item = patch.apply_to(item);
        }
    }
    append(
        &selection.experience_ids,
        &mut experience,
        &overrides.additional_experience,
    );

    let mut education = selection.education_ids.select(&source.education, |e| e.id.as_str());
    for item in &mut education {
        if let Some(patch) = overrides.education_overrides.get(&item.id) {
            *item = patch.apply_to(item);
        }
    }
    append(
        &selection.education_ids,
        &mut education,
        &overrides.additional_education,
    );

    let mut certifications = selection
        .certification_ids
        .select(&source.certifications, |c| c.id.as_str());
    append(
        &selection.certification_ids,
        &mut certifications,
        &overrides.additional_certifications,
    );

    let mut links = selection.link_ids.select(&source.links, |l| l.id.as_str());
    append(&selection.link_ids, &mut links, &overrides.additional_links);

    let skill_filter = &selection.skills;
    let extra = &overrides.additional_skills;
    let skills = Skills {
        technical: skill_names(&skill_filter.technical, &source.skills.technical, &extra.technical),
        languages: skill_names(&skill_filter.languages, &source.skills.languages, &extra.languages),
        tools: skill_names(&skill_filter.tools, &source.skills.tools, &extra.tools),
        soft: skill_names(&skill_filter.soft, &source.skills.soft, &extra.soft),
    };

    ResolvedResume {
        content: ResumeContent {
            personal_info,
            experience,
            education,
            skills,
            certifications,
            links,
        },
        section_order: link.section_order.clone(),
    }
}

fn append<T: Clone>(filter: &SectionFilter, items: &mut Vec<T>, additional: &[T]) {
    if !filter.is_excluded() {
        items.extend_from_slice(additional);
    }
}

fn skill_names(filter: &SectionFilter, names: &[String], additional: &[String]) -> Vec<String> {
    let mut selected = filter.select(names, |name| name.as_str());
    append(filter, &mut selected, additional);
    selected
}

/// Resolves a resume against its linked profile. `None` when the resume has no link or
/// links a different profile.
pub fn resolve_resume(resume: &Resume, profile: &Profile) -> Option<ResolvedResume> {
    let link = resume.profile_link.as_ref()?;
    (link.profile_id == profile.id).then(|| resolve(profile, link))
}

/// Whether a linked resume's stored content no longer matches a fresh resolution.
pub fn has_drifted(resume: &Resume, profile: &Profile) -> bool {
    resolve_resume(resume, profile).is_some_and(|resolved| resolved.content != resume.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Certification, Education, EducationPatch, Experience, ExperiencePatch, Link,
        PersonalInfoPatch, ProfileDraft, ResumeDraft, ResumeOverrides, SectionSelection,
    };
    use chrono::Utc;
    use sync_framework::SyncEntity;

    fn experience(id: &str, company: &str) -> Experience {
        Experience {
            id: id.into(),
            company: company.into(),
            position: "Engineer".into(),
            ..Default::default()
        }
    }

    fn profile() -> Profile {
        let content = ResumeContent {
            personal_info: PersonalInfo {
                name: "Ada Lovelace".into(),
                email: "ada@example.com".into(),
                summary: "Analyst".into(),
                ..Default::default()
            },
            experience: vec![
                experience("exp-1", "Analytical Engines"),
                experience("exp-2", "Babbage & Co"),
                experience("exp-3", "Royal Society"),
            ],
            education: vec![Education {
                id: "edu-1".into(),
                institution: "Home".into(),
                ..Default::default()
            }],
            skills: Skills {
                technical: vec!["Mathematics".into(), "Notation".into(), "Looms".into()],
                languages: vec!["English".into(), "French".into()],
                tools: vec![],
                soft: vec!["Writing".into()],
            },
            certifications: vec![Certification {
                id: "cert-1".into(),
                name: "Fellow".into(),
                ..Default::default()
            }],
            links: vec![
                Link {
                    id: "l1".into(),
                    label: "Notes".into(),
                    url: "https://notes".into(),
                },
                Link {
                    id: "l2".into(),
                    label: "Letters".into(),
                    url: "https://letters".into(),
                },
            ],
        };
        Profile::from_draft(
            "p-1".into(),
            ProfileDraft {
                name: "Master".into(),
                description: None,
                content,
            },
            Utc::now(),
        )
    }

    fn link(selection: SectionSelection, overrides: Option<ResumeOverrides>) -> ProfileLink {
        ProfileLink {
            profile_id: "p-1".into(),
            selection,
            overrides,
            section_order: None,
        }
    }

    #[test]
    fn test_empty_filter_takes_every_item_in_order() {
        let profile = profile();
        let resolved = resolve(&profile, &ProfileLink::all("p-1"));
        assert_eq!(resolved.content.experience, profile.content.experience);
        assert_eq!(resolved.content, profile.content);
    }

    #[test]
    fn test_null_filter_excludes_section() {
        let resolved = resolve(
            &profile(),
            &link(
                SectionSelection {
                    experience_ids: SectionFilter::Exclude,
                    ..Default::default()
                },
                None,
            ),
        );
        assert!(resolved.content.experience.is_empty());
        assert_eq!(resolved.content.education.len(), 1);
    }

    #[test]
    fn test_filter_keeps_profile_order_not_selection_order() {
        let resolved = resolve(
            &profile(),
            &link(
                SectionSelection {
                    experience_ids: SectionFilter::only(["exp-3", "exp-1", "missing"]),
                    ..Default::default()
                },
                None,
            ),
        );
        let ids: Vec<_> = resolved.content.experience.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["exp-1", "exp-3"]);
    }

    #[test]
    fn test_experience_override_merges_onto_selected_item() {
        let mut overrides = ResumeOverrides::default();
        overrides.experience_overrides.insert(
            "exp-1".into(),
            ExperiencePatch {
                position: Some("Lead Analyst".into()),
                ..Default::default()
            },
        );
        let resolved = resolve(
            &profile(),
            &link(
                SectionSelection {
                    experience_ids: SectionFilter::only(["exp-1"]),
                    ..Default::default()
                },
                Some(overrides),
            ),
        );
        assert_eq!(resolved.content.experience.len(), 1);
        let item = &resolved.content.experience[0];
        assert_eq!(item.position, "Lead Analyst");
        assert_eq!(item.company, "Analytical Engines");
    }

    #[test]
    fn test_education_override_and_additional_items() {
        let mut overrides = ResumeOverrides::default();
        overrides.education_overrides.insert(
            "edu-1".into(),
            EducationPatch {
                degree: Some("Self-taught".into()),
                ..Default::default()
            },
        );
        overrides.additional_links.push(Link {
            id: "extra".into(),
            label: "Portfolio".into(),
            url: "https://portfolio".into(),
        });
        let resolved = resolve(
            &profile(),
            &link(
                SectionSelection {
                    link_ids: SectionFilter::only(["l2"]),
                    ..Default::default()
                },
                Some(overrides),
            ),
        );
        assert_eq!(resolved.content.education[0].degree, "Self-taught");
        let ids: Vec<_> = resolved.content.links.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["l2", "extra"]);
    }

    #[test]
    fn test_excluded_section_ignores_additional_items() {
        let mut overrides = ResumeOverrides::default();
        overrides.additional_experience.push(experience("extra", "Side"));
        let resolved = resolve(
            &profile(),
            &link(
                SectionSelection {
                    experience_ids: SectionFilter::Exclude,
                    ..Default::default()
                },
                Some(overrides),
            ),
        );
        assert!(resolved.content.experience.is_empty());
    }

    #[test]
    fn test_personal_info_rules() {
        let overrides = ResumeOverrides {
            personal_info: Some(PersonalInfoPatch {
                name: Some("A. Lovelace".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let resolved = resolve(
            &profile(),
            &link(
                SectionSelection {
                    include_summary: false,
                    ..Default::default()
                },
                Some(overrides.clone()),
            ),
        );
        let info = &resolved.content.personal_info;
        assert_eq!(info.name, "A. Lovelace");
        assert_eq!(info.email, "ada@example.com");
        assert!(info.summary.is_empty());

        let hidden = resolve(
            &profile(),
            &link(
                SectionSelection {
                    include_personal_info: false,
                    ..Default::default()
                },
                Some(overrides),
            ),
        );
        assert_eq!(hidden.content.personal_info, PersonalInfo::default());
    }

    #[test]
    fn test_skills_filter_by_name_per_category() {
        let mut selection = SectionSelection::default();
        selection.skills.technical = SectionFilter::only(["Looms", "Mathematics"]);
        selection.skills.languages = SectionFilter::Exclude;
        let mut overrides = ResumeOverrides::default();
        overrides.additional_skills.technical.push("Rust".into());
        overrides.additional_skills.languages.push("Italian".into());

        let resolved = resolve(&profile(), &link(selection, Some(overrides)));
        let skills = &resolved.content.skills;
        assert_eq!(skills.technical, vec!["Mathematics", "Looms", "Rust"]);
        assert!(skills.languages.is_empty());
        assert_eq!(skills.soft, vec!["Writing"]);
    }

    #[test]
    fn test_section_order_passes_through_and_profile_is_untouched() {
        let profile = profile();
        let before = profile.clone();
        let mut link = ProfileLink::all("p-1");
        link.section_order = Some(vec!["skills".into(), "experience".into()]);

        let first = resolve(&profile, &link);
        let second = resolve(&profile, &link);
        assert_eq!(first, second);
        assert_eq!(first.section_order, link.section_order);
        assert_eq!(profile, before);
    }

    #[test]
    fn test_resolve_resume_and_drift() {
        let profile = profile();
        let mut resume = Resume::from_draft(
            "r-1".into(),
            ResumeDraft {
                title: "CV".into(),
                content: profile.content.clone(),
                profile_link: Some(ProfileLink::all("p-1")),
            },
            Utc::now(),
        );
        assert!(!has_drifted(&resume, &profile));

        resume.content.personal_info.name = "Edited".into();
        assert!(has_drifted(&resume, &profile));

        resume.profile_link = Some(ProfileLink::all("p-other"));
        assert!(resolve_resume(&resume, &profile).is_none());
        assert!(!has_drifted(&resume, &profile));
    }
}
