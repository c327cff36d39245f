use super::context::RunContext;
use super::expect::Expectation;
use crate::simulator::SimulatedMessage;
use crate::utils::config::{HarnessConfig, Patterns};

/// Kind of interactive selection a step sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectKind {
    List,
    Button,
}

/// What a step sends to the app
#[derive(Debug, Clone, PartialEq)]
pub enum StepInput {
    Text(String),
    Select {
        id: String,
        title: Option<String>,
        kind: SelectKind,
    },
}

/// One scripted message and the expectation on its reply
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub input: StepInput,
    pub expect: Expectation,
    /// Sender override for this step only
    pub sender: Option<String>,
}

impl Step {
    pub fn text(name: impl Into<String>, body: impl Into<String>, expect: Expectation) -> Self {
        Self {
            name: name.into(),
            input: StepInput::Text(body.into()),
            expect,
            sender: None,
        }
    }

    pub fn select(
        name: impl Into<String>,
        id: impl Into<String>,
        kind: SelectKind,
        expect: Expectation,
    ) -> Self {
        Self {
            name: name.into(),
            input: StepInput::Select {
                id: id.into(),
                title: None,
                kind,
            },
            expect,
            sender: None,
        }
    }

    pub fn as_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Build the message, substituting `${var}` references from the context
    pub fn to_message(&self, ctx: &RunContext, scenario_sender: Option<&str>) -> SimulatedMessage {
        let message = match &self.input {
            StepInput::Text(body) => SimulatedMessage::text(ctx.substitute_vars(body)),
            StepInput::Select { id, title, kind } => {
                let id = ctx.substitute_vars(id);
                let title = title.as_ref().map(|t| ctx.substitute_vars(t));
                match kind {
                    SelectKind::List => SimulatedMessage::list_reply(id, title.as_deref()),
                    SelectKind::Button => SimulatedMessage::button_reply(id, title.as_deref()),
                }
            }
        };

        match self.sender.as_deref().or(scenario_sender) {
            Some(sender) => message.from_sender(ctx.substitute_vars(sender)),
            None => message,
        }
    }
}

/// Ordered list of steps
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    /// Sender for every step without its own override
    pub sender: Option<String>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sender: None,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

pub const GREETING: &str = "greeting";
pub const BOOKING: &str = "booking";

/// "Hi Response Test"
pub fn greeting() -> Scenario {
    Scenario::new(GREETING).step(Step::text(
        "Hi Response Test",
        "Hi",
        Expectation::contains_all(["welcome", "name"]),
    ))
}

/// Complete booking conversation from first contact to confirmation
pub fn booking(config: &HarnessConfig) -> Result<Scenario, regex::Error> {
    let Patterns {
        onboarding,
        main_menu,
        service_list,
        location_list,
        provider_list,
        date_list,
        time_list,
        booking_confirmation,
    } = &config.patterns;

    Ok(Scenario::new(BOOKING)
        .step(Step::text("Start conversation", "Hi", Expectation::matches(onboarding)?))
        .step(Step::text(
            "Enter name",
            "${userName}",
            Expectation::matches(main_menu)?,
        ))
        .step(Step::text("Select booking", "1", Expectation::matches(service_list)?))
        .step(Step::text("Select service", "1", Expectation::matches(location_list)?))
        .step(Step::text("Select location", "1", Expectation::matches(provider_list)?))
        .step(Step::text("Select provider", "1", Expectation::matches(date_list)?))
        .step(Step::text("Select date", "1", Expectation::matches(time_list)?))
        .step(Step::text(
            "Select time",
            "1",
            Expectation::matches(booking_confirmation)?,
        )))
}

/// Look up a built-in scenario by name
pub fn builtin(name: &str, config: &HarnessConfig) -> Option<Result<Scenario, regex::Error>> {
    match name {
        GREETING => Some(Ok(greeting())),
        BOOKING => Some(booking(config)),
        _ => None,
    }
}
