/// Wizard pages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Step {
    /// Welcome text.
    #[default]
    Intro,
    /// Pick the configuration directories to register the package with.
    ChooseConfigs,
    /// Edit and validate the destination path.
    ChooseDestination,
    /// Review before anything is written.
    Confirm,
    /// The payload could not be found automatically.
    LocatePayload(PayloadPrompt),
    Installing,
    Finished,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadPrompt {
    /// Asking whether to locate the payload by hand.
    Ask,
    /// Typing the payload path.
    Enter,
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Step::Intro => "WELCOME",
            Step::ChooseConfigs => "CONFIGURATIONS",
            Step::ChooseDestination => "LOCATION",
            Step::Confirm => "CONFIRM",
            Step::LocatePayload(_) => "PAYLOAD",
            Step::Installing => "INSTALLING",
            Step::Finished => "DONE",
            Step::Failed(_) => "FAILED",
        }
    }

    /// Page reached by "Next" without side effects, if any.
    pub fn next(&self) -> Option<Step> {
        match self {
            Step::Intro => Some(Step::ChooseConfigs),
            Step::ChooseConfigs => Some(Step::ChooseDestination),
            Step::ChooseDestination => Some(Step::Confirm),
            _ => None,
        }
    }

    pub fn prev(&self) -> Option<Step> {
        match self {
            Step::ChooseConfigs => Some(Step::Intro),
            Step::ChooseDestination => Some(Step::ChooseConfigs),
            Step::Confirm => Some(Step::ChooseDestination),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Finished | Step::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_pages_round_trip() {
        let mut step = Step::default();
        let mut visited = vec![step.clone()];
        while let Some(next) = step.next() {
            visited.push(next.clone());
            step = next;
        }
        assert_eq!(
            visited,
            [
                Step::Intro,
                Step::ChooseConfigs,
                Step::ChooseDestination,
                Step::Confirm
            ]
        );

        while let Some(prev) = step.prev() {
            step = prev;
        }
        assert_eq!(step, Step::Intro);
    }

    #[test]
    fn installation_pages_have_no_navigation() {
        for step in [
            Step::LocatePayload(PayloadPrompt::Ask),
            Step::Installing,
            Step::Finished,
            Step::Failed("boom".to_string()),
        ] {
            assert_eq!(step.next(), None);
            assert_eq!(step.prev(), None);
        }
        assert!(Step::Failed(String::new()).is_terminal());
        assert!(!Step::Installing.is_terminal());
    }
}
