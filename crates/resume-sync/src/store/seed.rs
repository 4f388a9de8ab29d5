//! Demo content for first-time demo sessions.

use crate::model::{
    Certification, Education, Experience, Link, PersonalInfo, Profile, ProfileLink,
    ResumeContent, Skills,
};
use crate::model::{Resume, SectionFilter, SectionSelection};
use crate::resolver::resolve;
use chrono::{DateTime, Utc};

pub const DEMO_PROFILE_ID: &str = "demo-profile";
pub const DEMO_RESUME_ID: &str = "demo-resume";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn demo_profile(now: DateTime<Utc>) -> Profile {
    let content = ResumeContent {
        personal_info: PersonalInfo {
            name: "Alex Morgan".into(),
            title: "Backend Engineer".into(),
            email: "alex.morgan@example.com".into(),
            location: "Lisbon, Portugal".into(),
            github: "github.com/alexmorgan".into(),
            summary: "Engineer focused on reliable data pipelines and offline-first apps.".into(),
            ..Default::default()
        },
        experience: vec![
            Experience {
                id: "demo-exp-1".into(),
                company: "Harbor Logistics".into(),
                position: "Senior Backend Engineer".into(),
                location: "Remote".into(),
                start_date: "2021-03".into(),
                current: true,
                description: "Own the shipment tracking API.".into(),
                highlights: strings(&[
                    "Cut p99 latency from 800ms to 120ms",
                    "Led the move to event sourcing",
                ]),
                ..Default::default()
            },
            Experience {
                id: "demo-exp-2".into(),
                company: "Northwind Labs".into(),
                position: "Software Engineer".into(),
                location: "Porto".into(),
                start_date: "2018-01".into(),
                end_date: "2021-02".into(),
                description: "Built sync services for field tablets.".into(),
                highlights: strings(&["Designed the conflict resolution layer"]),
                ..Default::default()
            },
        ],
        education: vec![Education {
            id: "demo-edu-1".into(),
            institution: "University of Porto".into(),
            degree: "MSc".into(),
            field: "Computer Science".into(),
            start_date: "2016".into(),
            end_date: "2018".into(),
            ..Default::default()
        }],
        skills: Skills {
            technical: strings(&["Rust", "PostgreSQL", "Distributed systems"]),
            languages: strings(&["English", "Portuguese"]),
            tools: strings(&["Docker", "Grafana"]),
            soft: strings(&["Mentoring"]),
        },
        certifications: vec![Certification {
            id: "demo-cert-1".into(),
            name: "Certified Kubernetes Administrator".into(),
            issuer: "CNCF".into(),
            date: "2022-06".into(),
            ..Default::default()
        }],
        links: vec![Link {
            id: "demo-link-1".into(),
            label: "Blog".into(),
            url: "https://alexmorgan.dev".into(),
        }],
    };
    Profile {
        id: DEMO_PROFILE_ID.into(),
        user_id: None,
        name: "Demo profile".into(),
        description: Some("Sample master profile".into()),
        content,
        created_at: now,
        updated_at: now,
    }
}

/// A resume derived from [`demo_profile`]: the current role only, no soft skills.
pub fn demo_resume(now: DateTime<Utc>) -> Resume {
    let mut selection = SectionSelection {
        experience_ids: SectionFilter::only(["demo-exp-1"]),
        ..Default::default()
    };
    selection.skills.soft = SectionFilter::Exclude;
    let link = ProfileLink {
        selection,
        ..ProfileLink::all(DEMO_PROFILE_ID)
    };
    let resolved = resolve(&demo_profile(now), &link);

    Resume {
        id: DEMO_RESUME_ID.into(),
        user_id: None,
        title: "Demo resume".into(),
        content: resolved.content,
        profile_link: Some(link),
        created_at: now,
        updated_at: now,
        version: Some(1),
    }
}
