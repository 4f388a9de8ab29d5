//! Partial updates for document content.
//!
//! Every field is optional and absent fields are skipped when serializing, so two patches
//! that say the same thing serialize to the same string. Application merges two named
//! levels: `content` per field, then `content.personalInfo` and `content.skills` per field.
//! Everything deeper is replaced wholesale.

use super::content::{
    Certification, Education, Experience, Link, PersonalInfo, ResumeContent, Skills,
};
use serde::{Deserialize, Deserializer, Serialize};

pub(crate) fn assign<V: Clone>(slot: &mut V, value: &Option<V>) {
    if let Some(value) = value {
        *slot = value.clone();
    }
}

/// Deserializes a clearable field. With `#[serde(default)]` an absent field stays `None`;
/// an explicit `null` becomes `Some(None)`, which clears the value.
pub(crate) fn clearable<'de, D, V>(deserializer: D) -> Result<Option<Option<V>>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    Option::<V>::deserialize(deserializer).map(Some)
}

/// Merges nested patches when both sides carry one; otherwise the later side wins.
pub(crate) fn merge_nested<P>(earlier: Option<P>, later: Option<P>, merge: fn(P, P) -> P) -> Option<P> {
    match (earlier, later) {
        (Some(earlier), Some(later)) => Some(merge(earlier, later)),
        (earlier, later) => later.or(earlier),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl PersonalInfoPatch {
    pub fn apply_to(&self, info: &PersonalInfo) -> PersonalInfo {
        let mut next = info.clone();
        assign(&mut next.name, &self.name);
        assign(&mut next.title, &self.title);
        assign(&mut next.email, &self.email);
        assign(&mut next.phone, &self.phone);
        assign(&mut next.location, &self.location);
        assign(&mut next.website, &self.website);
        assign(&mut next.linkedin, &self.linkedin);
        assign(&mut next.github, &self.github);
        assign(&mut next.summary, &self.summary);
        next
    }

    pub fn merge(self, later: Self) -> Self {
        Self {
            name: later.name.or(self.name),
            title: later.title.or(self.title),
            email: later.email.or(self.email),
            phone: later.phone.or(self.phone),
            location: later.location.or(self.location),
            website: later.website.or(self.website),
            linkedin: later.linkedin.or(self.linkedin),
            github: later.github.or(self.github),
            summary: later.summary.or(self.summary),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft: Option<Vec<String>>,
}

impl SkillsPatch {
    pub fn apply_to(&self, skills: &Skills) -> Skills {
        let mut next = skills.clone();
        assign(&mut next.technical, &self.technical);
        assign(&mut next.languages, &self.languages);
        assign(&mut next.tools, &self.tools);
        assign(&mut next.soft, &self.soft);
        next
    }

    pub fn merge(self, later: Self) -> Self {
        Self {
            technical: later.technical.or(self.technical),
            languages: later.languages.or(self.languages),
            tools: later.tools.or(self.tools),
            soft: later.soft.or(self.soft),
        }
    }
}

/// Per-item override for an experience entry (`id` is never overridden).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperiencePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlights: Option<Vec<String>>,
}

impl ExperiencePatch {
    pub fn apply_to(&self, item: &Experience) -> Experience {
        let mut next = item.clone();
        assign(&mut next.company, &self.company);
        assign(&mut next.position, &self.position);
        assign(&mut next.location, &self.location);
        assign(&mut next.start_date, &self.start_date);
        assign(&mut next.end_date, &self.end_date);
        assign(&mut next.current, &self.current);
        assign(&mut next.description, &self.description);
        assign(&mut next.highlights, &self.highlights);
        next
    }
}

/// Per-item override for an education entry (`id` is never overridden).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpa: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlights: Option<Vec<String>>,
}

impl EducationPatch {
    pub fn apply_to(&self, item: &Education) -> Education {
        let mut next = item.clone();
        assign(&mut next.institution, &self.institution);
        assign(&mut next.degree, &self.degree);
        assign(&mut next.field, &self.field);
        assign(&mut next.start_date, &self.start_date);
        assign(&mut next.end_date, &self.end_date);
        assign(&mut next.gpa, &self.gpa);
        assign(&mut next.highlights, &self.highlights);
        next
    }
}

/// Partial update of [`ResumeContent`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_info: Option<PersonalInfoPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<Vec<Experience>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education: Option<Vec<Education>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<SkillsPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certifications: Option<Vec<Certification>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Link>>,
}

impl ContentPatch {
    pub fn apply_to(&self, content: &ResumeContent) -> ResumeContent {
        let mut next = content.clone();
        if let Some(info) = &self.personal_info {
            next.personal_info = info.apply_to(&content.personal_info);
        }
        if let Some(skills) = &self.skills {
            next.skills = skills.apply_to(&content.skills);
        }
        assign(&mut next.experience, &self.experience);
        assign(&mut next.education, &self.education);
        assign(&mut next.certifications, &self.certifications);
        assign(&mut next.links, &self.links);
        next
    }

    pub fn merge(self, later: Self) -> Self {
        Self {
            personal_info: merge_nested(
                self.personal_info,
                later.personal_info,
                PersonalInfoPatch::merge,
            ),
            experience: later.experience.or(self.experience),
            education: later.education.or(self.education),
            skills: merge_nested(self.skills, later.skills, SkillsPatch::merge),
            certifications: later.certifications.or(self.certifications),
            links: later.links.or(self.links),
        }
    }

    /// Replaces the whole content: every section is set.
    pub fn replace_all(content: ResumeContent) -> Self {
        let ResumeContent {
            personal_info,
            experience,
            education,
            skills,
            certifications,
            links,
        } = content;
        Self {
            personal_info: Some(PersonalInfoPatch {
                name: Some(personal_info.name),
                title: Some(personal_info.title),
                email: Some(personal_info.email),
                phone: Some(personal_info.phone),
                location: Some(personal_info.location),
                website: Some(personal_info.website),
                linkedin: Some(personal_info.linkedin),
                github: Some(personal_info.github),
                summary: Some(personal_info.summary),
            }),
            experience: Some(experience),
            education: Some(education),
            skills: Some(SkillsPatch {
                technical: Some(skills.technical),
                languages: Some(skills.languages),
                tools: Some(skills.tools),
                soft: Some(skills.soft),
            }),
            certifications: Some(certifications),
            links: Some(links),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(value: &str) -> ContentPatch {
        ContentPatch {
            personal_info: Some(PersonalInfoPatch {
                name: Some(value.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_personal_info_merges_per_field() {
        let content = ResumeContent {
            personal_info: PersonalInfo {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let next = name("Grace").apply_to(&content);
        assert_eq!(next.personal_info.name, "Grace");
        assert_eq!(next.personal_info.email, "ada@example.com");
    }

    #[test]
    fn test_lists_are_replaced_not_merged() {
        let content = ResumeContent {
            links: vec![Link {
                id: "l1".into(),
                label: "Blog".into(),
                url: "https://a".into(),
            }],
            ..Default::default()
        };
        let patch = ContentPatch {
            links: Some(vec![]),
            ..Default::default()
        };
        assert!(patch.apply_to(&content).links.is_empty());
    }

    #[test]
    fn test_merge_is_last_write_wins_at_two_levels() {
        let earlier = ContentPatch {
            personal_info: Some(PersonalInfoPatch {
                name: Some("A".into()),
                email: Some("a@x".into()),
                ..Default::default()
            }),
            skills: Some(SkillsPatch {
                tools: Some(vec!["git".into()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let later = ContentPatch {
            personal_info: Some(PersonalInfoPatch {
                name: Some("B".into()),
                ..Default::default()
            }),
            skills: Some(SkillsPatch {
                soft: Some(vec!["writing".into()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = earlier.merge(later);
        let info = merged.personal_info.unwrap();
        assert_eq!(info.name.as_deref(), Some("B"));
        assert_eq!(info.email.as_deref(), Some("a@x"));
        let skills = merged.skills.unwrap();
        assert_eq!(skills.tools, Some(vec!["git".to_string()]));
        assert_eq!(skills.soft, Some(vec!["writing".to_string()]));
    }

    #[test]
    fn test_absent_fields_are_not_serialized() {
        let json = serde_json::to_string(&name("X")).unwrap();
        assert_eq!(json, r#"{"personalInfo":{"name":"X"}}"#);
    }

    #[test]
    fn test_replace_all_reproduces_content() {
        let content = ResumeContent {
            personal_info: PersonalInfo {
                name: "Ada".into(),
                summary: "Engineer".into(),
                ..Default::default()
            },
            skills: Skills {
                technical: vec!["Rust".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let other = ResumeContent {
            personal_info: PersonalInfo {
                phone: "555".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(ContentPatch::replace_all(content.clone()).apply_to(&other), content);
    }
}
