pub mod review_list_route;
pub mod review_status_route;
