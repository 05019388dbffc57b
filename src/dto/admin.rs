use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct ToggleActiveResponse {
    pub status: &'static str,
    pub new_state: bool,
}
