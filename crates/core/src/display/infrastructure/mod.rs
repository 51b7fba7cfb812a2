pub mod macroquad_display;
