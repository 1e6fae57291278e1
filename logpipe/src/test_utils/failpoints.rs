use fail::FailScenario;

/// Configures a set of failpoints for the duration of a test.
///
/// All configured failpoints are turned off again when the scenario is dropped.
pub struct CustomFailScenario<'a> {
    _scenario: FailScenario<'a>,
    failpoints: Vec<(String, String)>,
}

impl<'a> CustomFailScenario<'a> {
    pub fn setup(failpoints: &[(&str, &str)]) -> CustomFailScenario<'a> {
        let scenario = FailScenario::setup();
        let failpoints = failpoints
            .iter()
            .map(|(name, action)| (name.to_string(), action.to_string()))
            .collect::<Vec<_>>();

        for (failpoint, action) in failpoints.iter() {
            fail::cfg(failpoint, action).unwrap()
        }

        Self {
            _scenario: scenario,
            failpoints,
        }
    }

    /// Turns every configured failpoint off while keeping the scenario alive.
    pub fn disable_all(&self) {
        for (failpoint, _) in self.failpoints.iter() {
            fail::cfg(failpoint, "off").unwrap()
        }
    }

    pub fn teardown(self) {
        drop(self);
    }
}

impl<'a> Drop for CustomFailScenario<'a> {
    fn drop(&mut self) {
        self.disable_all();
    }
}
