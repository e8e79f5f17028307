#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    order_checker::rocket()
}
