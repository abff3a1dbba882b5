/// Mode navigation shared by every sensor.
///
/// Sensors with a single mode implement navigation as no-ops and keep
/// reporting the same mode name.
pub trait SensorModes {
    /// Display name of the sensor type.
    fn name(&self) -> &'static str;

    fn number_of_modes(&self) -> usize;

    fn selected_mode(&self) -> &'static str;

    fn select_next_mode(&self);

    fn select_previous_mode(&self);
}
