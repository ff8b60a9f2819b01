//! Demo experts and projects for a fresh database. Every insert is skipped
//! when its record is already there, so running it on each start is safe.

use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;

use crate::db::Database;
use crate::error::Result;
use crate::models::project::Difficulty;
use crate::models::{
    CreateExpertRequest, CreateProjectRequest, CreateUserRequest, Expert, Project, Role, User,
};

struct SeedExpert {
    uid: &'static str,
    email: &'static str,
    display_name: &'static str,
    photo_url: &'static str,
    bio: &'static str,
    expertise: &'static [&'static str],
    hourly_rate: f64,
    rating: f64,
    total_reviews: i64,
    years_of_experience: i64,
    total_sessions: i64,
}

const EXPERTS: [SeedExpert; 3] = [
    SeedExpert {
        uid: "seed-expert-1",
        email: "alex.uiux@example.com",
        display_name: "Alex Rivera",
        photo_url: "https://images.unsplash.com/photo-1573496359142-b8d87734a5a2?ixlib=rb-4.0.3&auto=format&fit=crop&w=256&q=80",
        bio: "Senior UI/UX Designer with 8 years of experience creating intuitive digital experiences. Specialized in Design Systems, User Research, and Prototyping. Previous experience at top tech startups.",
        expertise: &["UI/UX Design", "Figma", "User Research", "Prototyping", "Web Design"],
        hourly_rate: 85.0,
        rating: 4.9,
        total_reviews: 42,
        years_of_experience: 8,
        total_sessions: 156,
    },
    SeedExpert {
        uid: "seed-expert-2",
        email: "sarah.dev@example.com",
        display_name: "Sarah Chen",
        photo_url: "https://images.unsplash.com/photo-1494790108377-be9c29b29330?ixlib=rb-4.0.3&auto=format&fit=crop&w=256&q=80",
        bio: "Full Stack Developer passionate about scalable architecture and clean code. Expert in the MERN stack and cloud infrastructure. React Native enthusiast.",
        expertise: &["Full Stack Dev", "React", "Node.js", "MongoDB", "AWS"],
        hourly_rate: 95.0,
        rating: 4.8,
        total_reviews: 38,
        years_of_experience: 6,
        total_sessions: 120,
    },
    SeedExpert {
        uid: "seed-expert-3",
        email: "mike.mobile@example.com",
        display_name: "Mike Johnson",
        photo_url: "https://images.unsplash.com/photo-1500648767791-00dcc994a43e?ixlib=rb-4.0.3&auto=format&fit=crop&w=256&q=80",
        bio: "Mobile Application Developer specializing in cross-platform development. I help students build their first mobile apps and launch them to the App Store.",
        expertise: &["Mobile Dev", "React Native", "Flutter", "iOS", "Android"],
        hourly_rate: 75.0,
        rating: 4.7,
        total_reviews: 25,
        years_of_experience: 4,
        total_sessions: 85,
    },
];

struct SeedProject {
    title: &'static str,
    description: &'static str,
    tech: &'static [&'static str],
    difficulty: Difficulty,
    github_url: &'static str,
}

const PROJECTS: [SeedProject; 10] = [
    SeedProject {
        title: "EcoTrack - Sustainable Living App",
        description: "A mobile application that helps users track their carbon footprint and suggests daily eco-friendly habits. Features include gamification, community challenges, and detailed impact analytics.",
        tech: &["React Native", "Firebase", "Node.js", "Redux"],
        difficulty: Difficulty::Intermediate,
        github_url: "https://github.com/example/ecotrack",
    },
    SeedProject {
        title: "AI Study Companion",
        description: "An intelligent study assistant that uses NLP to generate flashcards and quizzes from lecture notes. Includes spaced repetition algorithms and progress tracking.",
        tech: &["Python", "TensorFlow", "React", "FastAPI"],
        difficulty: Difficulty::Advanced,
        github_url: "https://github.com/example/ai-study",
    },
    SeedProject {
        title: "LocalMarket - Community Exchange",
        description: "A web platform for local communities to buy, sell, and trade goods. Focuses on hyper-local discovery and trust-based transactions.",
        tech: &["Next.js", "PostgreSQL", "Prisma", "Tailwind"],
        difficulty: Difficulty::Intermediate,
        github_url: "https://github.com/example/localmarket",
    },
    SeedProject {
        title: "CryptoViz - Portfolio Tracker",
        description: "Real-time cryptocurrency portfolio tracker with advanced visualization tools. Supports integration with major exchanges via API.",
        tech: &["Vue.js", "D3.js", "Express", "Socket.IO"],
        difficulty: Difficulty::Advanced,
        github_url: "https://github.com/example/cryptoviz",
    },
    SeedProject {
        title: "MindfulAI - Mental Health Chatbot",
        description: "A dedicated conversational AI trained on CBT principles to provide immediate support and daily check-ins for students facing stress.",
        tech: &["Python", "PyTorch", "React Native", "FastAPI"],
        difficulty: Difficulty::Advanced,
        github_url: "https://github.com/example/mindfulai",
    },
    SeedProject {
        title: "BlockVote - Secure Voting",
        description: "Decentralized voting application using Ethereum smart contracts to ensure transparency and prevent fraud in student council elections.",
        tech: &["Solidity", "Web3.js", "React", "Truffle"],
        difficulty: Difficulty::Advanced,
        github_url: "https://github.com/example/blockvote",
    },
    SeedProject {
        title: "EduShare - Note Sharing",
        description: "A peer-to-peer platform for sharing lecture notes, summaries, and study guides. Incentivized with a token system.",
        tech: &["MERN Stack", "Redux", "AWS S3"],
        difficulty: Difficulty::Beginner,
        github_url: "https://github.com/example/edushare",
    },
    SeedProject {
        title: "FitQuest - RPG Fitness App",
        description: "Gamifies daily exercise by turning workouts into RPG battles. Users level up their characters by completing fitness goals.",
        tech: &["Flutter", "Firebase", "Google Fit API"],
        difficulty: Difficulty::Intermediate,
        github_url: "https://github.com/example/fitquest",
    },
    SeedProject {
        title: "UrbanFarm - IoT Plant System",
        description: "IoT-based monitoring system for indoor plants. Measures soil moisture, light, and temperature, and automates watering.",
        tech: &["C++", "Arduino", "Raspberry Pi", "React"],
        difficulty: Difficulty::Advanced,
        github_url: "https://github.com/example/urbanfarm",
    },
    SeedProject {
        title: "CodeCollab - Real-time Editor",
        description: "A collaborative code editor supporting multiple languages, syntax highlighting, and integrated video chat for pair programming.",
        tech: &["Socket.IO", "React", "Monaco Editor", "WebRTC"],
        difficulty: Difficulty::Advanced,
        github_url: "https://github.com/example/codecollab",
    },
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn seed_user(seed: &SeedExpert) -> Result<User> {
    CreateUserRequest {
        email: seed.email.to_string(),
        display_name: seed.display_name.to_string(),
        role: Some(Role::Expert),
        photo_url: Some(seed.photo_url.to_string()),
    }
    .into_user(seed.uid)
}

fn seed_expert(seed: &SeedExpert, user_id: ObjectId) -> Result<Expert> {
    let mut expert = CreateExpertRequest {
        bio: seed.bio.to_string(),
        expertise: strings(seed.expertise),
        hourly_rate: seed.hourly_rate,
        availability: Vec::new(),
        years_of_experience: Some(seed.years_of_experience),
        linkedin_url: None,
        github_url: None,
    }
    .into_expert(user_id)?;
    expert.rating = seed.rating;
    expert.total_reviews = seed.total_reviews;
    expert.total_sessions = seed.total_sessions;
    Ok(expert)
}

/// Project `index` is owned by `owner` and joined by a rotating slice of `others`.
fn seed_project(index: usize, owner: ObjectId, others: &[ObjectId]) -> Result<Project> {
    let seed = &PROJECTS[index];
    let mut project = CreateProjectRequest {
        title: seed.title.to_string(),
        description: seed.description.to_string(),
        tech: strings(seed.tech),
        difficulty: seed.difficulty,
        github_url: Some(seed.github_url.to_string()),
    }
    .into_project(owner)?;

    let extra = index % (others.len() + 1);
    for member in others.iter().take(extra) {
        if *member != owner {
            project.add_member(*member)?;
        }
    }
    Ok(project)
}

/// Inserts the demo experts, their user records and the sample projects.
/// Users are matched by `uid`, experts by `userId` and projects by title.
pub async fn seed_demo_data(db: &Database) -> Result<()> {
    let users = db.users();
    let experts = db.experts();
    let projects = db.projects();

    let mut user_ids = Vec::with_capacity(EXPERTS.len());
    for seed in &EXPERTS {
        let user_id = match users.find_one(doc! { "uid": seed.uid }).await? {
            Some(existing) => match existing.id {
                Some(id) => id,
                None => continue,
            },
            None => {
                let result = users.insert_one(seed_user(seed)?).await?;
                log::info!("Seeded user {}", seed.uid);
                match result.inserted_id.as_object_id() {
                    Some(id) => id,
                    None => continue,
                }
            }
        };

        if experts.find_one(doc! { "userId": user_id }).await?.is_none() {
            experts.insert_one(seed_expert(seed, user_id)?).await?;
            log::info!("Seeded expert profile for {}", seed.display_name);
        }
        user_ids.push(user_id);
    }

    let Some((&owner, others)) = user_ids.split_first() else {
        log::warn!("No seed users available, skipping demo projects");
        return Ok(());
    };

    let mut created = 0;
    for (index, seed) in PROJECTS.iter().enumerate() {
        if projects.count_documents(doc! { "title": seed.title }).await? > 0 {
            continue;
        }
        projects.insert_one(seed_project(index, owner, others)?).await?;
        created += 1;
    }
    log::info!("Demo data ready: {} new projects", created);
    Ok(())
}
