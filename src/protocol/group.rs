use crate::core::GroupId;

/// Whether a frame tagged `group_id` concerns a node in `my_group_id`
pub fn is_relevant(group_id: GroupId, my_group_id: GroupId) -> bool {
    group_id.is_all() || group_id == my_group_id
}
