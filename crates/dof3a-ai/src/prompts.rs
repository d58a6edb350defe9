//! Prompt templates. Each builder embeds caller data into fixed instruction
//! text; nothing here talks to the model.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::formatter::Engagement;

pub const FALLBACK_TOPIC: &str = "General concepts";
pub const MAX_SAMPLED_TOPICS: usize = 3;

type SubjectTopics = (&'static str, &'static [&'static str]);

/// Egyptian curriculum topics by grade and subject.
const CURRICULUM: &[(&str, &[SubjectTopics])] = &[
    (
        "Middle 1",
        &[
            ("Math", &["Integers", "Fractions", "Decimals", "Basic Algebra", "Geometry Basics"]),
            ("Science", &["Matter States", "Simple Machines", "Plant Biology", "Solar System"]),
            ("Arabic", &["Grammar Basics", "Reading Comprehension", "Poetry", "Composition"]),
            ("English", &["Present Tense", "Vocabulary", "Reading", "Basic Writing"]),
        ],
    ),
    (
        "Middle 2",
        &[
            ("Math", &["Algebra", "Geometry", "Statistics", "Equations", "Functions"]),
            ("Science", &["Chemistry Basics", "Physics Introduction", "Biology Systems"]),
            ("Arabic", &["Advanced Grammar", "Literature", "Writing Skills"]),
            ("English", &["Past Tenses", "Conditionals", "Advanced Vocabulary"]),
        ],
    ),
    (
        "Middle 3",
        &[
            ("Math", &["Advanced Algebra", "Geometry", "Probability", "Functions"]),
            ("Science", &["Chemical Reactions", "Forces and Motion", "Genetics Basics"]),
            ("Arabic", &["Poetry Analysis", "Essay Writing", "Classical Literature"]),
            ("English", &["Complex Grammar", "Academic Writing", "Literature Analysis"]),
        ],
    ),
    (
        "Senior 1",
        &[
            ("Math", &["Calculus Basics", "Trigonometry", "Statistics", "Logarithms"]),
            ("Physics", &["Mechanics", "Heat", "Sound", "Light"]),
            ("Chemistry", &["Atomic Structure", "Chemical Bonding", "Acids and Bases"]),
            ("Biology", &["Cell Biology", "Genetics", "Evolution"]),
        ],
    ),
    (
        "Senior 2",
        &[
            ("Math", &["Advanced Calculus", "Complex Numbers", "Matrices"]),
            ("Physics", &["Electricity", "Magnetism", "Waves", "Modern Physics"]),
            ("Chemistry", &["Organic Chemistry", "Chemical Equilibrium", "Thermodynamics"]),
            ("Biology", &["Human Biology", "Ecology", "Molecular Biology"]),
        ],
    ),
    (
        "Senior 3",
        &[
            ("Math", &["University Prep Calculus", "Statistics", "Discrete Math"]),
            ("Physics", &["Quantum Physics", "Relativity", "Nuclear Physics"]),
            ("Chemistry", &["Advanced Organic", "Physical Chemistry", "Biochemistry"]),
            ("Biology", &["Advanced Genetics", "Biotechnology", "Environmental Science"]),
        ],
    ),
];

/// Topic list for an exact grade and subject label, if the curriculum has one.
pub fn curriculum_topics(grade_level: &str, subject: &str) -> Option<&'static [&'static str]> {
    CURRICULUM
        .iter()
        .find(|(grade, _)| *grade == grade_level)
        .and_then(|(_, subjects)| subjects.iter().find(|(name, _)| *name == subject))
        .map(|(_, topics)| *topics)
}

/// Up to three random topics, or `General concepts` for unknown pairs.
pub fn sample_topics<R: Rng + ?Sized>(grade_level: &str, subject: &str, rng: &mut R) -> Vec<String> {
    match curriculum_topics(grade_level, subject) {
        Some(topics) => topics
            .choose_multiple(rng, MAX_SAMPLED_TOPICS.min(topics.len()))
            .map(|topic| topic.to_string())
            .collect(),
        None => vec![FALLBACK_TOPIC.to_string()],
    }
}

pub fn tutor_prompt(user_context: &str, history: Option<&str>, question: &str) -> String {
    let history = history
        .filter(|text| !text.trim().is_empty())
        .unwrap_or("No previous conversation");

    format!(
        "You are dof3a, an intelligent and supportive AI tutor for Egyptian students.
You help with homework, exam preparation, and educational guidance.

SAFETY GUIDELINES:
- Only provide educational content
- Never generate harmful, inappropriate, or offensive content
- If asked about non-educational topics, politely redirect to educational matters
- Respect cultural and religious sensitivities
- Always maintain a friendly and professional tone

USER PROFILE:
{user_context}

CONVERSATION HISTORY:
{history}

PERSONALIZATION INSTRUCTIONS:
- Use the user's name when available to make responses more personal
- Tailor your responses to their grade level and academic focus
- Reference their previous posts or activity when relevant and helpful
- Adjust difficulty and examples to match their academic level
- If they're a high-performing student, you can provide more challenging content
- If they seem to struggle, provide more supportive and foundational explanations
- Consider their engagement level when structuring responses

Provide helpful, accurate, and encouraging educational support. Always respond in a friendly,
professional manner appropriate for students. Use their profile information to give personalized,
relevant assistance.

Student Question: {question}

Your Response:"
    )
}

/// Student data used to tune question difficulty.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceContext {
    pub score: u32,
    pub grade: String,
    pub engagement: Engagement,
}

impl PerformanceContext {
    fn render(&self) -> String {
        format!(
            "STUDENT PERFORMANCE CONTEXT:
- Current Score: {} points
- Grade Level: {}
- Platform Engagement: {}

Adjust question difficulty and style based on this student's performance level.",
            self.score, self.grade, self.engagement
        )
    }
}

pub struct QuestionPrompt<'a> {
    pub subject: &'a str,
    pub grade_level: &'a str,
    pub difficulty: &'a str,
    pub num_questions: u32,
    pub topics: &'a [String],
    pub performance: Option<&'a PerformanceContext>,
}

pub fn question_prompt(input: &QuestionPrompt<'_>) -> String {
    let performance = input
        .performance
        .map(PerformanceContext::render)
        .unwrap_or_default();

    format!(
        r#"You are an educational content generator for Egyptian students.
Generate {count} multiple choice questions for a 1v1 knockout game.

REQUIREMENTS:
- Subject: {subject}
- Grade Level: {grade}
- Difficulty: {difficulty}
- Topics to focus on: {topics}
- Questions should be appropriate for Egyptian curriculum
- Each question must have exactly 4 options (A, B, C, D)
- Only one correct answer per question
- Questions should be clear and unambiguous
- Avoid culturally sensitive content

{performance}

Return ONLY a JSON array with this exact format (no extra text):
[
  {{
    "question": "Question text here?",
    "options": ["A. Option 1", "B. Option 2", "C. Option 3", "D. Option 4"],
    "correct_answer": "A",
    "topic": "Topic name",
    "explanation": "Brief explanation of the correct answer"
  }}
]

Generate exactly {count} questions."#,
        count = input.num_questions,
        subject = input.subject,
        grade = input.grade_level,
        difficulty = input.difficulty,
        topics = input.topics.join(", "),
    )
}

pub fn recommendation_prompt(user_context: &str, subject: Option<&str>) -> String {
    let subject_focus = match subject {
        Some(subject) => format!("Focus specifically on {subject}."),
        None => "Cover all relevant subjects for their grade level.".to_string(),
    };

    format!(
        r#"You are an educational advisor for Egyptian students. Based on the student's profile and activity,
generate personalized study recommendations.

STUDENT PROFILE:
{user_context}

INSTRUCTIONS:
- {subject_focus}
- Provide 5-8 specific, actionable study recommendations
- Consider their grade level and current performance
- Include both study techniques and content suggestions
- Be encouraging but realistic
- Tailor recommendations to Egyptian curriculum
- Consider their engagement level and suggest improvements if needed

Return ONLY a JSON object with this format (no extra text):
{{
  "recommendations": [
    "Specific recommendation 1",
    "Specific recommendation 2",
    "etc..."
  ],
  "focus_areas": ["Area 1", "Area 2", "Area 3"],
  "study_tips": ["Tip 1", "Tip 2", "Tip 3"],
  "motivation_message": "Encouraging message for the student"
}}"#
    )
}

pub fn moderation_prompt(content: &str, content_type: &str, grade_level: &str) -> String {
    format!(
        r#"Analyze this {content_type} content from an Egyptian educational social media platform:

CONTENT TO MODERATE:
"{content}"

USER CONTEXT:
- Grade Level: {grade_level}

MODERATION CRITERIA:
1. Educational Relevance (0-10): Is this content educational or study-related?
2. Age Appropriateness (0-10): Suitable for middle/high school students?
3. Language Appropriateness (0-10): Professional and respectful language?
4. Safety Score (0-10): Free from harmful, bullying, or inappropriate content?
5. Curriculum Alignment (0-10): Aligns with Egyptian education curriculum?

ASSESSMENT REQUIREMENTS:
- Flag content that is not educational
- Identify inappropriate language or behavior
- Check for academic misconduct (cheating, plagiarism hints)
- Ensure cultural sensitivity for Egyptian context
- Verify age-appropriate content

RESPONSE FORMAT:
Educational_Relevance: [score]/10
Age_Appropriateness: [score]/10
Language_Appropriateness: [score]/10
Safety_Score: [score]/10
Curriculum_Alignment: [score]/10
Overall_Score: [average]/10
Decision: [APPROVE/REVIEW/REJECT]
Reasoning: [Brief explanation]
Suggestions: [Improvement suggestions if needed]
Educational_Tags: [Relevant subject tags]"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn known_grade_and_subject_samples_three_distinct_topics() {
        let mut rng = StdRng::seed_from_u64(7);
        let topics = sample_topics("Middle 1", "Math", &mut rng);
        let table = curriculum_topics("Middle 1", "Math").unwrap();

        assert_eq!(topics.len(), 3);
        for topic in &topics {
            assert!(table.contains(&topic.as_str()));
        }
        let mut unique = topics.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn unknown_pair_falls_back_to_general_concepts() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            sample_topics("Senior 1", "Art", &mut rng),
            vec!["General concepts".to_string()]
        );
        assert_eq!(
            sample_topics("Grade 4", "Math", &mut rng),
            vec!["General concepts".to_string()]
        );
    }

    #[test]
    fn tutor_prompt_defaults_history() {
        let prompt = tutor_prompt("=== USER PROFILE ===", None, "What is osmosis?");
        assert!(prompt.contains("CONVERSATION HISTORY:\nNo previous conversation"));
        assert!(prompt.contains("USER PROFILE:\n=== USER PROFILE ==="));
        assert!(prompt.ends_with("Student Question: What is osmosis?\n\nYour Response:"));

        let prompt = tutor_prompt("ctx", Some("Student: hi"), "q");
        assert!(prompt.contains("CONVERSATION HISTORY:\nStudent: hi"));
    }

    #[test]
    fn question_prompt_embeds_requirements_and_performance() {
        let topics = vec!["Algebra".to_string(), "Geometry".to_string()];
        let performance = PerformanceContext {
            score: 80,
            grade: "Middle 2".to_string(),
            engagement: Engagement::Moderate,
        };
        let prompt = question_prompt(&QuestionPrompt {
            subject: "Math",
            grade_level: "Middle 2",
            difficulty: "hard",
            num_questions: 4,
            topics: &topics,
            performance: Some(&performance),
        });

        assert!(prompt.contains("Generate 4 multiple choice questions"));
        assert!(prompt.contains("- Topics to focus on: Algebra, Geometry"));
        assert!(prompt.contains("- Current Score: 80 points"));
        assert!(prompt.contains("- Platform Engagement: Moderate"));
        assert!(prompt.contains("\"correct_answer\": \"A\""));
        assert!(prompt.ends_with("Generate exactly 4 questions."));
    }

    #[test]
    fn recommendation_prompt_uses_subject_focus() {
        assert!(recommendation_prompt("ctx", Some("Physics"))
            .contains("- Focus specifically on Physics."));
        assert!(recommendation_prompt("ctx", None)
            .contains("- Cover all relevant subjects for their grade level."));
    }

    #[test]
    fn moderation_prompt_lists_response_format() {
        let prompt = moderation_prompt("Check my notes", "post", "Senior 2");
        assert!(prompt.starts_with("Analyze this post content"));
        assert!(prompt.contains("\"Check my notes\""));
        assert!(prompt.contains("Decision: [APPROVE/REVIEW/REJECT]"));
    }
}
